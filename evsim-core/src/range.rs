//! Environmental corrections applied to a baseline range

use crate::imports::*;

/// Multiplicative range correction model.
///
/// `adjusted = base × f_temp × f_terrain × f_hvac × f_traffic`, where
/// `f_temp = max(1 − k (T − T_opt)², floor)` and `f_hvac` is a step function of
/// the distance between ambient temperature and the cabin comfort temperature.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RangeAdjuster {
    /// ambient temperature of least range loss \[°C\]
    pub temp_optimal_c: f64,
    /// quadratic temperature loss coefficient \[1/°C²\]
    pub k_temp_per_c2: f64,
    /// lower bound on `f_temp`
    pub f_temp_floor: f64,
    pub comfort_temp_c: f64,
    /// (temperature difference threshold \[°C\], factor) pairs, checked in
    /// order; the first threshold strictly exceeded applies
    pub hvac_tiers: Vec<(f64, f64)>,
    /// HVAC factor inside the innermost threshold
    pub hvac_base: f64,
}

impl Default for RangeAdjuster {
    fn default() -> Self {
        Self {
            temp_optimal_c: 21.5,
            k_temp_per_c2: 1e-4,
            f_temp_floor: 0.5,
            comfort_temp_c: 22.0,
            hvac_tiers: vec![(10.0, 0.80), (5.0, 0.90)],
            hvac_base: 0.98,
        }
    }
}

impl SerdeAPI for RangeAdjuster {
    fn init(&mut self) -> anyhow::Result<()> {
        self.check()
    }
}

/// Adjusted range and every factor that produced it
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct RangeAdjustment {
    pub base_range_km: f64,
    pub adjusted_range_km: f64,
    pub ambient_temp_c: f64,
    pub f_temp: f64,
    pub f_terrain: f64,
    pub f_hvac: f64,
    pub f_traffic: f64,
    pub total_factor: f64,
    pub range_loss_km: f64,
    pub range_loss_pct: f64,
}

impl SerdeAPI for RangeAdjustment {}

impl RangeAdjuster {
    /// Checks that the model is well-formed: factors in (0, 1], tiers ordered
    /// by decreasing threshold with non-decreasing factors
    pub fn check(&self) -> anyhow::Result<()> {
        ensure!(
            self.k_temp_per_c2 >= 0.0 && self.k_temp_per_c2.is_finite(),
            "{}",
            format_dbg!(self.k_temp_per_c2)
        );
        ensure!(
            self.f_temp_floor > 0.0 && self.f_temp_floor <= 1.0,
            "{}",
            format_dbg!(self.f_temp_floor)
        );
        ensure!(
            self.temp_optimal_c.is_finite() && self.comfort_temp_c.is_finite(),
            "reference temperatures must be finite"
        );
        let factors: Vec<f64> = self
            .hvac_tiers
            .iter()
            .map(|(_, f)| *f)
            .chain(std::iter::once(self.hvac_base))
            .collect();
        ensure!(
            factors.iter().all(|f| *f > 0.0 && *f <= 1.0),
            "HVAC factors must be in (0, 1]: {:?}",
            factors
        );
        ensure!(
            factors.windows(2).all(|w| w[0] <= w[1]),
            "HVAC factors must not decrease toward the comfort temperature: {:?}",
            factors
        );
        ensure!(
            self.hvac_tiers.windows(2).all(|w| w[0].0 > w[1].0)
                && self.hvac_tiers.iter().all(|(dt, _)| *dt >= 0.0),
            "HVAC thresholds must be non-negative and strictly decreasing: {:?}",
            self.hvac_tiers
        );
        Ok(())
    }

    /// Temperature factor, largest at `temp_optimal_c` and never below `f_temp_floor`
    pub fn f_temp(&self, ambient_c: f64) -> f64 {
        (1.0 - self.k_temp_per_c2 * (ambient_c - self.temp_optimal_c).powi(2))
            .max(self.f_temp_floor)
    }

    /// HVAC factor, non-increasing with distance from `comfort_temp_c`
    pub fn f_hvac(&self, ambient_c: f64) -> f64 {
        let delta_c = (ambient_c - self.comfort_temp_c).abs();
        self.hvac_tiers
            .iter()
            .find(|(threshold, _)| delta_c > *threshold)
            .map(|(_, f)| *f)
            .unwrap_or(self.hvac_base)
    }

    /// Applies all corrections to `base_range_km`
    ///
    /// # Arguments
    /// * `base_range_km` - baseline range, finite and non-negative
    /// * `ambient_c` - ambient temperature \[°C\]
    /// * `terrain_factor` - caller supplied multiplier in (0, 1]
    /// * `traffic_factor` - caller supplied multiplier in (0, 1]
    pub fn adjust(
        &self,
        base_range_km: f64,
        ambient_c: f64,
        terrain_factor: f64,
        traffic_factor: f64,
    ) -> anyhow::Result<RangeAdjustment> {
        self.check()?;
        ensure!(
            base_range_km.is_finite() && base_range_km >= 0.0,
            "{}",
            format_dbg!(base_range_km)
        );
        ensure!(ambient_c.is_finite(), "{}", format_dbg!(ambient_c));
        for (name, f) in [("terrain_factor", terrain_factor), ("traffic_factor", traffic_factor)] {
            ensure!(f > 0.0 && f <= 1.0, "{name} must be in (0, 1], got {f}");
        }
        let f_temp = self.f_temp(ambient_c);
        let f_hvac = self.f_hvac(ambient_c);
        let total_factor = f_temp * terrain_factor * f_hvac * traffic_factor;
        let adjusted_range_km = base_range_km * total_factor;
        let range_loss_km = base_range_km - adjusted_range_km;
        Ok(RangeAdjustment {
            base_range_km,
            adjusted_range_km,
            ambient_temp_c: ambient_c,
            f_temp,
            f_terrain: terrain_factor,
            f_hvac,
            f_traffic: traffic_factor,
            total_factor,
            range_loss_km,
            range_loss_pct: if base_range_km > 0.0 {
                range_loss_km / base_range_km * 100.0
            } else {
                0.0
            },
        })
    }
}
