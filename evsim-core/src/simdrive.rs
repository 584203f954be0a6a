//! Module containing the time-stepped energy calculator and its inputs and outputs.

use crate::battery::BatteryModel;
use crate::cycle::DriveCycle;
use crate::dynamics::TractiveForces;
use crate::imports::*;
use crate::params::{
    check_finite, custom_error, derived_errors, into_result, ParamSet,
};

pub mod simdrive_impl;
pub mod simdrive_iter;

pub use simdrive_iter::SimBatch;

/// Finite-difference scheme used to derive acceleration from the speed trace.
/// Boundary samples fall back to the one-sided difference that exists.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum DiffScheme {
    /// `(v[i+1] - v[i]) / (t[i+1] - t[i])`
    Forward,
    /// `(v[i] - v[i-1]) / (t[i] - t[i-1])`
    Backward,
    /// `(v[i+1] - v[i-1]) / (t[i+1] - t[i-1])`
    #[default]
    Central,
}

/// Efficiency applied to braking power on the regenerative path
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub enum RegenEffBasis {
    /// Regenerative efficiency alone
    #[default]
    Regen,
    /// Motor × inverter × regenerative efficiency
    FullPath,
}

/// Simulation controls that are not properties of the vehicle
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Validate)]
#[serde(default)]
pub struct SimParams {
    pub accel_scheme: DiffScheme,
    /// Constant headwind speed \[m/s\], negative for tailwind
    pub wind_speed_mps: f64,
    /// Ambient and battery temperature \[°C\]
    pub ambient_temp_c: f64,
    /// SOC above which regenerative power starts to taper
    #[validate(range(min = 0, max = 1))]
    pub regen_taper_start_soc: f64,
    /// SOC at which regenerative power reaches zero
    #[validate(range(min = 0, max = 1))]
    pub regen_taper_end_soc: f64,
    pub regen_eff_basis: RegenEffBasis,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            accel_scheme: DiffScheme::default(),
            wind_speed_mps: 0.0,
            ambient_temp_c: 25.0,
            regen_taper_start_soc: 0.8,
            regen_taper_end_soc: 1.0,
            regen_eff_basis: RegenEffBasis::default(),
        }
    }
}

impl SerdeAPI for SimParams {
    fn init(&mut self) -> anyhow::Result<()> {
        self.validate_all()
    }
}

impl SimParams {
    pub fn validate_all(&self) -> anyhow::Result<()> {
        let mut errors = derived_errors(self);
        check_finite(&mut errors, "wind_speed_mps", self.wind_speed_mps);
        check_finite(&mut errors, "ambient_temp_c", self.ambient_temp_c);
        if self.regen_taper_start_soc >= self.regen_taper_end_soc {
            custom_error(
                &mut errors,
                "regen_taper_start_soc",
                "taper_order",
                format!(
                    "regen taper start ({}) must be below taper end ({})",
                    self.regen_taper_start_soc, self.regen_taper_end_soc
                ),
            );
        }
        into_result(errors).map_err(|e| SimError::InvalidParams(e).into())
    }

    /// Fraction of rated regenerative power available at `soc`: 1 below the
    /// taper start, falling linearly to 0 at the taper end
    pub fn regen_taper(&self, soc: f64) -> f64 {
        if soc <= self.regen_taper_start_soc {
            1.0
        } else if soc >= self.regen_taper_end_soc {
            0.0
        } else {
            (self.regen_taper_end_soc - soc)
                / (self.regen_taper_end_soc - self.regen_taper_start_soc)
        }
    }
}

/// Transient state at one sample of the cycle
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SimState {
    /// index of the sample
    pub i: usize,
    pub time_s: f64,
    pub speed_mps: f64,
    pub accel_mps2: f64,
    pub forces: TractiveForces,
    /// power at the wheels \[kW\], negative when braking
    pub tractive_kw: f64,
    /// power drawn from the battery \[kW\], negative when charging
    pub battery_kw: f64,
    /// regenerative charging power \[kW\]
    pub regen_kw: f64,
    /// braking power dissipated by the friction brakes \[kW\]
    pub friction_brake_kw: f64,
    pub current_a: f64,
    pub terminal_voltage_v: f64,
    /// resistive loss inside the battery \[kW\]
    pub battery_loss_kw: f64,
    pub soc: f64,
}

/// Per-sample history of [`SimState`] as parallel vectors
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct SimStateHistoryVec {
    pub time_s: Vec<f64>,
    pub speed_mps: Vec<f64>,
    pub accel_mps2: Vec<f64>,
    pub tractive_force_n: Vec<f64>,
    pub tractive_kw: Vec<f64>,
    pub battery_kw: Vec<f64>,
    pub regen_kw: Vec<f64>,
    pub friction_brake_kw: Vec<f64>,
    pub current_a: Vec<f64>,
    pub terminal_voltage_v: Vec<f64>,
    pub battery_loss_kw: Vec<f64>,
    pub soc: Vec<f64>,
}

impl SerdeAPI for SimStateHistoryVec {}

impl SimStateHistoryVec {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            time_s: Vec::with_capacity(n),
            speed_mps: Vec::with_capacity(n),
            accel_mps2: Vec::with_capacity(n),
            tractive_force_n: Vec::with_capacity(n),
            tractive_kw: Vec::with_capacity(n),
            battery_kw: Vec::with_capacity(n),
            regen_kw: Vec::with_capacity(n),
            friction_brake_kw: Vec::with_capacity(n),
            current_a: Vec::with_capacity(n),
            terminal_voltage_v: Vec::with_capacity(n),
            battery_loss_kw: Vec::with_capacity(n),
            soc: Vec::with_capacity(n),
        }
    }

    pub fn push(&mut self, state: &SimState) {
        self.time_s.push(state.time_s);
        self.speed_mps.push(state.speed_mps);
        self.accel_mps2.push(state.accel_mps2);
        self.tractive_force_n.push(state.forces.total_n);
        self.tractive_kw.push(state.tractive_kw);
        self.battery_kw.push(state.battery_kw);
        self.regen_kw.push(state.regen_kw);
        self.friction_brake_kw.push(state.friction_brake_kw);
        self.current_a.push(state.current_a);
        self.terminal_voltage_v.push(state.terminal_voltage_v);
        self.battery_loss_kw.push(state.battery_loss_kw);
        self.soc.push(state.soc);
    }

    pub fn len(&self) -> usize {
        self.time_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State-of-charge bound conditions met during a run. These are reportable
/// states, not errors.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct SocBoundEvents {
    /// SOC was clamped at 0 before the end of the cycle
    pub depleted: bool,
    /// first sample at which SOC was clamped at 0
    pub first_depleted_i: Option<usize>,
    /// number of samples at which regeneration was capped at `soc_max`
    pub n_soc_max_clamped: usize,
    /// first sample at which SOC fell below `soc_min`
    pub first_below_soc_min_i: Option<usize>,
}

impl SocBoundEvents {
    pub fn soc_max_clamped(&self) -> bool {
        self.n_soc_max_clamped > 0
    }
}

/// Range implied by a run's consumption
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub enum RangeEstimate {
    /// Distance-based range \[km\]
    Distance(f64),
    /// The vehicle never moved: hours until the auxiliary draw alone
    /// exhausts the usable capacity
    Stationary { hours_to_depletion: f64 },
    /// No net energy was drawn from the battery
    Unbounded,
}

impl RangeEstimate {
    /// Distance-based range in km, if one exists
    pub fn km(&self) -> Option<f64> {
        match self {
            Self::Distance(km) => Some(*km),
            _ => None,
        }
    }
}

/// Aggregate output of one simulation run
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct SimResult {
    pub cycle_name: String,
    pub distance_km: f64,
    pub duration_s: f64,
    /// battery-side energy spent on traction \[kWh\]
    pub traction_kwh: f64,
    /// wheel-side traction energy \[kWh\]
    pub traction_wheel_kwh: f64,
    /// wheel-side braking energy demand \[kWh\]
    pub braking_wheel_kwh: f64,
    pub aux_kwh: f64,
    /// energy returned to the battery by regeneration \[kWh\]
    pub regen_kwh: f64,
    pub friction_brake_kwh: f64,
    /// resistive loss inside the battery \[kWh\], informational
    pub battery_loss_kwh: f64,
    /// traction + auxiliary − regenerated, floored at zero \[kWh\]
    pub net_kwh: f64,
    pub kwh_per_km: Option<f64>,
    pub kwh_per_100km: Option<f64>,
    pub range: RangeEstimate,
    /// Range left from the final SOC down to `soc_min` \[km\]
    pub remaining_range_km: Option<f64>,
    pub soc: Vec<f64>,
    pub soc_final: f64,
    pub soc_events: SocBoundEvents,
    /// number of samples demanding more than the motor's peak power
    pub n_peak_power_exceeded: usize,
}

impl SerdeAPI for SimResult {}

impl SimResult {
    /// Distance-based range \[km\], if one exists
    pub fn range_km(&self) -> Option<f64> {
        self.range.km()
    }
}

/// Running energy totals, all in kWh except distance
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub(crate) struct EnergyTotals {
    pub dist_m: f64,
    pub traction_kwh: f64,
    pub traction_wheel_kwh: f64,
    pub braking_wheel_kwh: f64,
    pub aux_kwh: f64,
    pub regen_kwh: f64,
    pub friction_brake_kwh: f64,
    pub battery_loss_kwh: f64,
}

/// Time-stepped energy and state-of-charge calculator for one vehicle on one
/// drive cycle. Each calculator owns its battery state, so independent
/// calculators can run concurrently.
#[derive(Clone, Debug)]
pub struct EnergyCalculator {
    pub params: ParamSet,
    pub cyc: DriveCycle,
    pub sim_params: SimParams,
    /// current step index
    pub i: usize,
    pub state: SimState,
    pub history: SimStateHistoryVec,
    pub(crate) battery: BatteryModel,
    pub(crate) accel_mps2: Array1<f64>,
    pub(crate) aux_kw: f64,
    pub(crate) totals: EnergyTotals,
    pub(crate) soc_events: SocBoundEvents,
    pub(crate) n_peak_power_exceeded: usize,
    result: Option<SimResult>,
}

impl EnergyCalculator {
    /// Creates a calculator with default [`SimParams`], validating every input
    pub fn new(params: ParamSet, cyc: DriveCycle) -> anyhow::Result<Self> {
        Self::with_sim_params(params, cyc, SimParams::default())
    }

    pub fn with_sim_params(
        params: ParamSet,
        cyc: DriveCycle,
        sim_params: SimParams,
    ) -> anyhow::Result<Self> {
        params.validate_all()?;
        cyc.init_checks()?;
        sim_params.validate_all()?;
        if cyc.len() < 2 {
            return Err(SimError::InsufficientData(format!(
                "drive cycle {:?} has {} sample(s); at least 2 are needed to integrate over time",
                cyc.name,
                cyc.len()
            ))
            .into());
        }
        let battery = BatteryModel::new(params.battery.clone());
        let aux_kw = params.aux.total_kw(sim_params.ambient_temp_c);
        let cyc_len = cyc.len();
        Ok(Self {
            params,
            cyc,
            sim_params,
            i: 0,
            state: SimState::default(),
            history: SimStateHistoryVec::with_capacity(cyc_len),
            battery,
            accel_mps2: Array1::zeros(cyc_len),
            aux_kw,
            totals: EnergyTotals::default(),
            soc_events: SocBoundEvents::default(),
            n_peak_power_exceeded: 0,
            result: None,
        })
    }

    /// Result of the last completed [`sim_drive`](EnergyCalculator::sim_drive)
    pub fn result(&self) -> Option<&SimResult> {
        self.result.as_ref()
    }

    /// Runs the simulation and returns its result
    pub fn run(mut self) -> anyhow::Result<SimResult> {
        self.sim_drive()?;
        self.result.take().with_context(|| format_dbg!())
    }
}
