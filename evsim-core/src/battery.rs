//! Lumped battery model: coulomb-counting state of charge plus an
//! internal-resistance voltage model.

use crate::imports::*;
use crate::params::BatteryParams;
use crate::utils::S_PER_H;

/// Coulomb counting update of state of charge.
///
/// Discharge current is positive, charging current negative. The result is
/// clamped to \[0, 1\].
///
/// # Arguments
/// * `current_a` - battery current \[A\]
/// * `dt_s` - time step \[s\]
/// * `soc_prev` - state of charge at the start of the step
/// * `capacity_ah` - charge capacity \[A·h\]
/// * `coulombic_eff` - coulombic efficiency
pub fn coulomb_counting(
    current_a: f64,
    dt_s: f64,
    soc_prev: f64,
    capacity_ah: f64,
    coulombic_eff: f64,
) -> f64 {
    (soc_prev - coulombic_eff * current_a * dt_s / (S_PER_H * capacity_ah)).clamp(0.0, 1.0)
}

/// Physical bound hit while updating state of charge
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub enum SocBound {
    /// Unclamped SOC fell below 0
    Empty,
    /// Unclamped SOC rose above 1
    Full,
}

/// Outcome of a single [`BatteryModel::update_soc`] call
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SocUpdate {
    pub soc: f64,
    /// state of charge before clamping to \[0, 1\]
    pub unclamped: f64,
    pub clamped: Option<SocBound>,
}

/// Battery state for one simulation run. State of charge is the only state
/// and changes only through [`BatteryModel::update_soc`].
#[derive(Clone, Debug, PartialEq)]
pub struct BatteryModel {
    params: BatteryParams,
    soc: f64,
}

impl BatteryModel {
    /// Creates a battery at `params.soc_initial`
    pub fn new(params: BatteryParams) -> Self {
        let soc = params.soc_initial;
        Self { params, soc }
    }

    pub fn params(&self) -> &BatteryParams {
        &self.params
    }

    pub fn soc(&self) -> f64 {
        self.soc
    }

    /// Advances state of charge by one coulomb-counting step.
    /// Errors if `current_a` or `dt_s` is not finite.
    pub fn update_soc(&mut self, current_a: f64, dt_s: f64) -> anyhow::Result<SocUpdate> {
        ensure!(
            current_a.is_finite() && dt_s.is_finite(),
            "{}\n{}",
            format_dbg!(current_a),
            format_dbg!(dt_s)
        );
        let capacity_ah = self.params.capacity_ah();
        let unclamped =
            self.soc - self.params.coulombic_eff * current_a * dt_s / (S_PER_H * capacity_ah);
        self.soc = coulomb_counting(
            current_a,
            dt_s,
            self.soc,
            capacity_ah,
            self.params.coulombic_eff,
        );
        let clamped = if unclamped < 0.0 {
            Some(SocBound::Empty)
        } else if unclamped > 1.0 {
            Some(SocBound::Full)
        } else {
            None
        };
        Ok(SocUpdate {
            soc: self.soc,
            unclamped,
            clamped,
        })
    }

    /// Caps state of charge at `soc_max`, returning the SOC removed (0 if none)
    pub fn cap_at_soc_max(&mut self) -> f64 {
        let excess = (self.soc - self.params.soc_max).max(0.0);
        if excess > 0.0 {
            self.soc = self.params.soc_max;
        }
        excess
    }

    /// Constant battery power \[kW\] that moves SOC by `delta_soc` over `dt_s`,
    /// the inverse of one coulomb-counting step at nominal voltage
    pub fn soc_delta_to_kw(&self, delta_soc: f64, dt_s: f64) -> f64 {
        let current_a = delta_soc * S_PER_H * self.params.capacity_ah()
            / (self.params.coulombic_eff * dt_s);
        current_a * self.params.nominal_voltage_v / 1e3
    }

    /// Internal resistance \[Ω\] at `temp_c`, `R_ref (1 + α (T − T_ref))`
    pub fn internal_resistance(&self, temp_c: f64) -> f64 {
        self.params.resistance_ohm
            * (1.0 + self.params.resistance_alpha_per_c * (temp_c - self.params.temp_ref_c))
    }

    /// Open circuit voltage \[V\] at `soc`
    pub fn ocv(&self, soc: f64) -> anyhow::Result<f64> {
        self.params.ocv.ocv(soc)
    }

    /// Terminal voltage \[V\], `OCV(soc) − I R(T)`
    pub fn terminal_voltage(&self, soc: f64, current_a: f64, temp_c: f64) -> anyhow::Result<f64> {
        Ok(self.ocv(soc)? - current_a * self.internal_resistance(temp_c))
    }

    /// Resistive loss \[W\], `I² R(T)`
    pub fn power_loss(&self, current_a: f64, temp_c: f64) -> f64 {
        current_a.powi(2) * self.internal_resistance(temp_c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::almost_eq;

    fn battery(soc_initial: f64) -> BatteryModel {
        BatteryModel::new(BatteryParams {
            soc_initial,
            soc_max: 1.0,
            ..Default::default()
        })
    }

    #[test]
    fn test_coulomb_counting() {
        // 50 A for one hour from a 187.5 Ah pack
        let soc = coulomb_counting(50.0, 3600.0, 1.0, 187.5, 0.99);
        assert!(almost_eq(soc, 1.0 - 0.99 * 50.0 / 187.5, None));
        assert!((soc - 0.736).abs() < 1e-9);
        let soc = coulomb_counting(50.0, 3600.0, 0.80, 187.5, 0.99);
        assert!((soc - 0.536).abs() < 1e-9);
        // charging raises SOC
        assert!(coulomb_counting(-50.0, 60.0, 0.5, 187.5, 0.99) > 0.5);
    }

    #[test]
    fn test_coulomb_counting_clamps() {
        assert_eq!(coulomb_counting(1e4, 3600.0, 0.1, 187.5, 0.99), 0.0);
        assert_eq!(coulomb_counting(-1e4, 3600.0, 0.9, 187.5, 0.99), 1.0);
    }

    #[test]
    fn test_update_soc() {
        let mut bat = battery(1.0);
        let update = bat.update_soc(50.0, 3600.0).unwrap();
        assert!((update.soc - 0.736).abs() < 1e-9);
        assert_eq!(update.clamped, None);
        assert_eq!(bat.soc(), update.soc);

        let update = bat.update_soc(1e4, 3600.0).unwrap();
        assert_eq!(update.soc, 0.0);
        assert_eq!(update.clamped, Some(SocBound::Empty));

        let update = bat.update_soc(-1e5, 3600.0).unwrap();
        assert_eq!(update.soc, 1.0);
        assert_eq!(update.clamped, Some(SocBound::Full));

        assert!(bat.update_soc(f64::NAN, 1.0).is_err());
        assert!(bat.update_soc(f64::INFINITY, 1.0).is_err());
        assert_eq!(bat.soc(), 1.0);
    }

    #[test]
    fn test_cap_at_soc_max() {
        let mut bat = BatteryModel::new(BatteryParams::default());
        bat.update_soc(-10.0, 60.0).unwrap();
        let soc_uncapped = bat.soc();
        assert!(soc_uncapped > 0.95);
        let excess = bat.cap_at_soc_max();
        assert!(almost_eq(excess, soc_uncapped - 0.95, Some(1e-12)));
        assert_eq!(bat.soc(), 0.95);
        assert_eq!(bat.cap_at_soc_max(), 0.0);
        // -10 A for 60 s at 400 V is 4 kW of charging
        assert!(almost_eq(bat.soc_delta_to_kw(soc_uncapped - 0.95, 60.0), 4.0, Some(1e-9)));
    }

    #[test]
    fn test_internal_resistance() {
        let bat = battery(0.5);
        assert!(almost_eq(bat.internal_resistance(25.0), 0.05, None));
        // R = 0.05 * (1 + 0.01 * (-10 - 25))
        assert!(almost_eq(bat.internal_resistance(-10.0), 0.0325, None));
        assert!(almost_eq(bat.internal_resistance(45.0), 0.06, None));
    }

    #[test]
    fn test_voltage_and_loss() {
        let bat = battery(0.5);
        assert!(almost_eq(bat.ocv(0.0).unwrap(), 320.0, None));
        assert!(almost_eq(bat.ocv(1.0).unwrap(), 420.0, None));
        assert!(almost_eq(bat.terminal_voltage(0.5, 100.0, 25.0).unwrap(), 365.0, None));
        assert!(almost_eq(bat.terminal_voltage(0.5, -100.0, 25.0).unwrap(), 375.0, None));
        assert!(almost_eq(bat.power_loss(100.0, 25.0), 500.0, None));
        assert!(almost_eq(bat.power_loss(-100.0, 25.0), 500.0, None));
    }
}
