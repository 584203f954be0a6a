//! Module containing vehicle, battery, powertrain, and auxiliary load parameters.
//!
//! All parameter structs are plain values: built once at simulation setup and
//! never mutated by the models. Physical constants such as air density and
//! gravitational acceleration are fields rather than globals so that runs with
//! different ambient conditions can proceed concurrently.

use crate::imports::*;
use crate::utils::Interp1D;
use std::borrow::Cow;
use validator::ValidationErrorsKind;

/// Adds a "positive" error for `field` unless `val` is finite and strictly greater than zero
pub(crate) fn check_positive(errors: &mut ValidationErrors, field: &'static str, val: f64) {
    if !(val.is_finite() && val > 0.0) {
        let mut err = ValidationError::new("positive");
        err.message = Some(Cow::from("must be finite and > 0"));
        err.add_param(Cow::from("value"), &val);
        errors.add(field, err);
    }
}

/// Adds an "efficiency" error for `field` unless `val` is in (0, 1]
pub(crate) fn check_efficiency(errors: &mut ValidationErrors, field: &'static str, val: f64) {
    if !(val > 0.0 && val <= 1.0) {
        let mut err = ValidationError::new("efficiency");
        err.message = Some(Cow::from("must be in (0, 1]"));
        err.add_param(Cow::from("value"), &val);
        errors.add(field, err);
    }
}

pub(crate) fn check_finite(errors: &mut ValidationErrors, field: &'static str, val: f64) {
    if !val.is_finite() {
        let mut err = ValidationError::new("finite");
        err.add_param(Cow::from("value"), &val);
        errors.add(field, err);
    }
}

pub(crate) fn custom_error(
    errors: &mut ValidationErrors,
    field: &'static str,
    code: &'static str,
    message: String,
) {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::from(message));
    errors.add(field, err);
}

/// Runs the derived field checks and seeds an error collection with their output
pub(crate) fn derived_errors<T: Validate>(val: &T) -> ValidationErrors {
    match val.validate() {
        Ok(_) => ValidationErrors::new(),
        Err(e) => e,
    }
}

pub(crate) fn into_result(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Moves every field-level error of `src` into `dst`
pub(crate) fn merge_errors(dst: &mut ValidationErrors, src: ValidationErrors) {
    for (field, kind) in src.errors().iter() {
        if let ValidationErrorsKind::Field(errs) = kind {
            for err in errs {
                dst.add(*field, err.clone());
            }
        }
    }
}

/// Glider and road-load parameters
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Validate)]
pub struct VehicleParams {
    /// Total vehicle mass, including payload \[kg\]
    pub veh_kg: f64,
    /// Frontal area \[m²\]
    pub frontal_area_m2: f64,
    /// Aerodynamic drag coefficient
    pub drag_coef: f64,
    /// Rolling resistance coefficient
    #[validate(range(min = 0))]
    pub wheel_rr_coef: f64,
    /// Air density \[kg/m³\]
    #[serde(default = "VehicleParams::default_air_density")]
    pub air_density_kg_per_m3: f64,
    /// Gravitational acceleration \[m/s²\]
    #[serde(default = "VehicleParams::default_a_grav")]
    pub a_grav_mps2: f64,
    /// Wheel radius \[m\], informational
    #[serde(default = "VehicleParams::default_wheel_radius")]
    pub wheel_radius_m: f64,
}

impl Default for VehicleParams {
    fn default() -> Self {
        Self {
            veh_kg: 1_800.0,
            frontal_area_m2: 2.3,
            drag_coef: 0.28,
            wheel_rr_coef: 0.010,
            air_density_kg_per_m3: Self::default_air_density(),
            a_grav_mps2: Self::default_a_grav(),
            wheel_radius_m: Self::default_wheel_radius(),
        }
    }
}

impl VehicleParams {
    fn default_air_density() -> f64 {
        1.2
    }

    fn default_a_grav() -> f64 {
        9.81
    }

    fn default_wheel_radius() -> f64 {
        0.34
    }

    /// Checks field ranges, reporting every offending field
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = derived_errors(self);
        check_positive(&mut errors, "veh_kg", self.veh_kg);
        check_positive(&mut errors, "frontal_area_m2", self.frontal_area_m2);
        check_positive(&mut errors, "drag_coef", self.drag_coef);
        check_positive(&mut errors, "air_density_kg_per_m3", self.air_density_kg_per_m3);
        check_positive(&mut errors, "a_grav_mps2", self.a_grav_mps2);
        check_positive(&mut errors, "wheel_radius_m", self.wheel_radius_m);
        into_result(errors)
    }
}

/// Open circuit voltage as a function of state of charge
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub enum OcvCurve {
    /// Straight line between the empty and full voltages
    Linear { ocv_empty_v: f64, ocv_full_v: f64 },
    /// Tabulated (SOC, voltage) pairs, SOC strictly increasing
    Table(Interp1D),
}

impl Default for OcvCurve {
    fn default() -> Self {
        Self::Linear {
            ocv_empty_v: 320.0,
            ocv_full_v: 420.0,
        }
    }
}

impl OcvCurve {
    /// Open circuit voltage \[V\] at `soc`
    pub fn ocv(&self, soc: f64) -> anyhow::Result<f64> {
        match self {
            Self::Linear {
                ocv_empty_v,
                ocv_full_v,
            } => Ok(ocv_empty_v + soc * (ocv_full_v - ocv_empty_v)),
            Self::Table(interp) => interp
                .interpolate(soc)
                .with_context(|| format_dbg!(soc)),
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        match self {
            Self::Linear {
                ocv_empty_v,
                ocv_full_v,
            } => {
                ensure!(
                    ocv_empty_v.is_finite() && ocv_full_v.is_finite(),
                    "OCV endpoints must be finite"
                );
                ensure!(
                    ocv_full_v >= ocv_empty_v,
                    "OCV must not decrease with SOC: empty {ocv_empty_v} V, full {ocv_full_v} V"
                );
            }
            Self::Table(interp) => {
                interp.validate()?;
                ensure!(interp.is_monotonic(), "OCV table must not decrease with SOC");
            }
        }
        Ok(())
    }
}

/// Traction battery parameters
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Validate)]
pub struct BatteryParams {
    /// Nominal energy capacity \[kWh\]
    pub nominal_capacity_kwh: f64,
    /// Usable energy capacity \[kWh\], no more than nominal
    pub usable_capacity_kwh: f64,
    /// Nominal pack voltage \[V\]
    pub nominal_voltage_v: f64,
    #[validate(range(min = 0, max = 1))]
    pub soc_min: f64,
    #[validate(range(min = 0, max = 1))]
    pub soc_max: f64,
    #[validate(range(min = 0, max = 1))]
    pub soc_initial: f64,
    /// Internal resistance at `temp_ref_c` \[Ω\]
    #[validate(range(min = 0))]
    pub resistance_ohm: f64,
    /// Linear temperature coefficient of internal resistance \[1/°C\]
    pub resistance_alpha_per_c: f64,
    pub temp_ref_c: f64,
    pub coulombic_eff: f64,
    #[serde(default)]
    pub ocv: OcvCurve,
}

impl Default for BatteryParams {
    fn default() -> Self {
        Self {
            nominal_capacity_kwh: 75.0,
            usable_capacity_kwh: 70.0,
            nominal_voltage_v: 400.0,
            soc_min: 0.10,
            soc_max: 0.95,
            soc_initial: 0.95,
            resistance_ohm: 0.05,
            resistance_alpha_per_c: 0.01,
            temp_ref_c: 25.0,
            coulombic_eff: 0.99,
            ocv: OcvCurve::default(),
        }
    }
}

impl BatteryParams {
    /// Charge capacity \[A·h\] implied by nominal energy and voltage
    pub fn capacity_ah(&self) -> f64 {
        self.nominal_capacity_kwh * 1e3 / self.nominal_voltage_v
    }

    /// Checks field ranges and cross-field invariants, reporting every offending field
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = derived_errors(self);
        check_positive(&mut errors, "nominal_capacity_kwh", self.nominal_capacity_kwh);
        check_positive(&mut errors, "usable_capacity_kwh", self.usable_capacity_kwh);
        check_positive(&mut errors, "nominal_voltage_v", self.nominal_voltage_v);
        check_efficiency(&mut errors, "coulombic_eff", self.coulombic_eff);
        check_finite(&mut errors, "resistance_alpha_per_c", self.resistance_alpha_per_c);
        check_finite(&mut errors, "temp_ref_c", self.temp_ref_c);
        if self.usable_capacity_kwh > self.nominal_capacity_kwh {
            custom_error(
                &mut errors,
                "usable_capacity_kwh",
                "exceeds_nominal",
                format!(
                    "usable capacity {} kWh exceeds nominal capacity {} kWh",
                    self.usable_capacity_kwh, self.nominal_capacity_kwh
                ),
            );
        }
        if self.soc_min >= self.soc_max {
            custom_error(
                &mut errors,
                "soc_min",
                "soc_bounds_order",
                format!(
                    "soc_min ({}) must be less than soc_max ({})",
                    self.soc_min, self.soc_max
                ),
            );
        }
        if !(self.soc_initial >= self.soc_min && self.soc_initial <= self.soc_max) {
            custom_error(
                &mut errors,
                "soc_initial",
                "soc_initial_bounds",
                format!(
                    "soc_initial ({}) must be within [{}, {}]",
                    self.soc_initial, self.soc_min, self.soc_max
                ),
            );
        }
        if let Err(e) = self.ocv.check() {
            custom_error(&mut errors, "ocv", "ocv_curve", e.to_string());
        }
        into_result(errors)
    }
}

/// Electric drive parameters
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Validate)]
pub struct PowertrainParams {
    /// Peak motor output power \[kW\]
    pub motor_peak_kw: f64,
    /// Peak motor torque \[N·m\], informational
    #[validate(range(min = 0))]
    pub motor_peak_torque_nm: f64,
    /// Single-speed reduction ratio, informational
    pub gear_ratio: f64,
    pub motor_eff: f64,
    pub trans_eff: f64,
    pub inverter_eff: f64,
    /// Fraction of braking power recoverable by regeneration
    pub regen_eff: f64,
    /// Maximum regenerative charging power \[kW\]
    #[validate(range(min = 0))]
    pub regen_max_kw: f64,
}

impl Default for PowertrainParams {
    fn default() -> Self {
        Self {
            motor_peak_kw: 150.0,
            motor_peak_torque_nm: 310.0,
            gear_ratio: 9.0,
            motor_eff: 0.95,
            trans_eff: 0.97,
            inverter_eff: 0.96,
            regen_eff: 0.70,
            regen_max_kw: 70.0,
        }
    }
}

impl PowertrainParams {
    /// Battery-to-wheel efficiency in traction
    pub fn traction_eff(&self) -> f64 {
        self.motor_eff * self.trans_eff * self.inverter_eff
    }

    /// Wheel-to-battery efficiency in regeneration
    pub fn regen_path_eff(&self) -> f64 {
        self.motor_eff * self.inverter_eff * self.regen_eff
    }

    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = derived_errors(self);
        check_positive(&mut errors, "motor_peak_kw", self.motor_peak_kw);
        check_positive(&mut errors, "gear_ratio", self.gear_ratio);
        check_efficiency(&mut errors, "motor_eff", self.motor_eff);
        check_efficiency(&mut errors, "trans_eff", self.trans_eff);
        check_efficiency(&mut errors, "inverter_eff", self.inverter_eff);
        check_efficiency(&mut errors, "regen_eff", self.regen_eff);
        into_result(errors)
    }
}

/// Auxiliary (non-propulsion) electrical loads
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Validate)]
pub struct AuxLoads {
    /// Fixed HVAC power \[kW\], used when `cabin_ua_kw_per_k` is `None`
    #[validate(range(min = 0))]
    pub hvac_kw: f64,
    #[validate(range(min = 0))]
    pub electronics_kw: f64,
    #[validate(range(min = 0))]
    pub lighting_kw: f64,
    #[serde(default = "AuxLoads::default_cabin_temp")]
    pub cabin_temp_target_c: f64,
    /// HVAC coefficient of performance
    #[serde(default = "AuxLoads::default_cop")]
    pub hvac_cop: f64,
    /// Cabin thermal conductance \[kW/K\]; when set, HVAC power follows ambient temperature
    #[serde(default)]
    pub cabin_ua_kw_per_k: Option<f64>,
}

impl Default for AuxLoads {
    fn default() -> Self {
        Self {
            hvac_kw: 0.0,
            electronics_kw: 0.3,
            lighting_kw: 0.1,
            cabin_temp_target_c: Self::default_cabin_temp(),
            hvac_cop: Self::default_cop(),
            cabin_ua_kw_per_k: None,
        }
    }
}

impl AuxLoads {
    fn default_cabin_temp() -> f64 {
        22.0
    }

    fn default_cop() -> f64 {
        2.5
    }

    /// HVAC electrical power \[kW\] at ambient temperature `ambient_c`
    pub fn hvac_kw_at(&self, ambient_c: f64) -> f64 {
        match self.cabin_ua_kw_per_k {
            Some(ua) => ua * (ambient_c - self.cabin_temp_target_c).abs() / self.hvac_cop,
            None => self.hvac_kw,
        }
    }

    /// Total auxiliary power \[kW\], constant over a run
    pub fn total_kw(&self, ambient_c: f64) -> f64 {
        self.hvac_kw_at(ambient_c) + self.electronics_kw + self.lighting_kw
    }

    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = derived_errors(self);
        check_positive(&mut errors, "hvac_cop", self.hvac_cop);
        check_finite(&mut errors, "cabin_temp_target_c", self.cabin_temp_target_c);
        if let Some(ua) = self.cabin_ua_kw_per_k {
            if !(ua.is_finite() && ua >= 0.0) {
                custom_error(
                    &mut errors,
                    "cabin_ua_kw_per_k",
                    "range",
                    format!("must be finite and >= 0, got {ua}"),
                );
            }
        }
        into_result(errors)
    }
}

/// Complete set of model parameters for one simulated vehicle
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct ParamSet {
    pub veh: VehicleParams,
    pub battery: BatteryParams,
    pub powertrain: PowertrainParams,
    pub aux: AuxLoads,
}

impl SerdeAPI for ParamSet {
    fn init(&mut self) -> anyhow::Result<()> {
        self.validate_all()
    }
}

impl ParamSet {
    /// Assembles and validates a parameter set
    pub fn new(
        veh: VehicleParams,
        battery: BatteryParams,
        powertrain: PowertrainParams,
        aux: AuxLoads,
    ) -> anyhow::Result<Self> {
        let params = Self {
            veh,
            battery,
            powertrain,
            aux,
        };
        params.validate_all()?;
        Ok(params)
    }

    /// Validates every component, failing with [`SimError::InvalidParams`]
    /// listing all offending fields
    pub fn validate_all(&self) -> anyhow::Result<()> {
        let mut errors = ValidationErrors::new();
        for result in [
            self.veh.check(),
            self.battery.check(),
            self.powertrain.check(),
            self.aux.check(),
        ] {
            if let Err(e) = result {
                merge_errors(&mut errors, e);
            }
        }
        if errors.errors().is_empty() {
            Ok(())
        } else {
            Err(SimError::InvalidParams(errors).into())
        }
    }
}
