//! Comparison of simulated consumption and range against published reference data

use crate::cycle::DriveCycle;
use crate::imports::*;
use crate::params::ParamSet;
use crate::simdrive::{EnergyCalculator, SimBatch, SimParams, SimResult};

/// A vehicle with published consumption and range figures
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ReferenceVehicle {
    pub name: String,
    pub params: ParamSet,
    pub city_kwh_per_100km: f64,
    pub highway_kwh_per_100km: f64,
    pub combined_kwh_per_100km: f64,
    pub range_km: f64,
}

impl SerdeAPI for ReferenceVehicle {
    fn init(&mut self) -> anyhow::Result<()> {
        self.params
            .validate_all()
            .with_context(|| format!("reference vehicle {:?}", self.name))?;
        for (metric, val) in [
            ("city_kwh_per_100km", self.city_kwh_per_100km),
            ("highway_kwh_per_100km", self.highway_kwh_per_100km),
            ("combined_kwh_per_100km", self.combined_kwh_per_100km),
            ("range_km", self.range_km),
        ] {
            ensure!(
                val.is_finite() && val > 0.0,
                "reference {metric} must be finite and positive, got {val}"
            );
        }
        Ok(())
    }
}

/// One compared metric
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ValidationRow {
    pub metric: String,
    pub model: f64,
    pub reference: f64,
    /// `(model − reference) / reference × 100`
    pub error_pct: f64,
}

impl ValidationRow {
    fn new(metric: &str, model: f64, reference: f64) -> Self {
        Self {
            metric: metric.to_string(),
            model,
            reference,
            error_pct: (model - reference) / reference * 100.0,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct ValidationReport {
    pub vehicle: String,
    pub rows: Vec<ValidationRow>,
}

impl SerdeAPI for ValidationReport {}

impl ValidationReport {
    pub fn row(&self, metric: &str) -> Option<&ValidationRow> {
        self.rows.iter().find(|r| r.metric == metric)
    }

    pub fn max_abs_error_pct(&self) -> f64 {
        self.rows
            .iter()
            .map(|r| r.error_pct.abs())
            .fold(0.0, f64::max)
    }
}

impl ReferenceVehicle {
    /// Built-in 2018 Nissan Leaf (40 kWh) with EPA figures
    pub fn nissan_leaf_2018() -> anyhow::Result<Self> {
        Self::from_yaml(include_str!("../resources/reference/nissan_leaf_2018.yaml"))
    }

    /// City cycle: 1400 s of stop-and-go driving
    pub fn city_cycle() -> anyhow::Result<DriveCycle> {
        DriveCycle::urban(1_400.0, 1.0)
    }

    /// Highway cycle: 1800 s at a constant 100 km/h
    pub fn highway_cycle() -> anyhow::Result<DriveCycle> {
        DriveCycle::constant_speed(100.0, 1_800.0, 1.0)
    }

    /// Simulates the city and highway cycles and compares consumption and
    /// range with the reference figures. Combined consumption is the mean of
    /// city and highway; modeled range uses city consumption.
    pub fn validate(&self, sim_params: &SimParams) -> anyhow::Result<ValidationReport> {
        let mut batch: SimBatch = [Self::city_cycle()?, Self::highway_cycle()?]
            .into_iter()
            .map(|cyc| {
                EnergyCalculator::with_sim_params(self.params.clone(), cyc, sim_params.clone())
            })
            .collect::<anyhow::Result<_>>()?;
        batch.sim_drive(None)?;
        let results = batch.results()?;
        let per_100km = |res: &SimResult| {
            res.kwh_per_100km
                .with_context(|| format!("{:?} covered no distance", res.cycle_name))
        };
        let city = per_100km(results[0])?;
        let highway = per_100km(results[1])?;
        let combined = (city + highway) / 2.0;
        let range_km = self.params.battery.usable_capacity_kwh / (city / 100.0);

        let report = ValidationReport {
            vehicle: self.name.clone(),
            rows: vec![
                ValidationRow::new("city_kwh_per_100km", city, self.city_kwh_per_100km),
                ValidationRow::new("highway_kwh_per_100km", highway, self.highway_kwh_per_100km),
                ValidationRow::new("combined_kwh_per_100km", combined, self.combined_kwh_per_100km),
                ValidationRow::new("range_km", range_km, self.range_km),
            ],
        };
        #[cfg(feature = "logging")]
        log::info!(
            "{}: max abs error {:.1} %",
            report.vehicle,
            report.max_abs_error_pct()
        );
        Ok(report)
    }
}
