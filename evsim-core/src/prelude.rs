//! Convenience re-exports of the types most callers need to run a simulation.

pub use crate::battery::{coulomb_counting, BatteryModel, SocUpdate};
pub use crate::cycle::{DriveCycle, DriveCycleElement};
pub use crate::dynamics::{TractiveForces, VehicleDynamics};
pub use crate::error::SimError;
pub use crate::params::{AuxLoads, BatteryParams, OcvCurve, ParamSet, PowertrainParams, VehicleParams};
pub use crate::range::{RangeAdjuster, RangeAdjustment};
pub use crate::simdrive::{
    DiffScheme, EnergyCalculator, RangeEstimate, RegenEffBasis, SimBatch, SimParams, SimResult,
    SocBoundEvents,
};
pub use crate::traits::{ApproxEq, SerdeAPI};
pub use crate::uncertainty::{MonteCarlo, UncertaintySummary};
pub use crate::validation::{ReferenceVehicle, ValidationReport};
