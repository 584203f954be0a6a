//! Monte Carlo uncertainty propagation through independent simulation runs

use crate::cycle::DriveCycle;
use crate::imports::*;
use crate::params::ParamSet;
use crate::simdrive::{EnergyCalculator, SimParams, SimResult};
use crate::utils::{mean_std, percentile_sorted};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;

/// Smallest multiplicative perturbation applied to a strictly positive parameter
const MIN_FACTOR: f64 = 0.05;

/// Monte Carlo settings. Each relative standard deviation scales a normally
/// distributed multiplicative factor with mean 1 applied to the named
/// parameter(s).
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MonteCarlo {
    pub n_trials: usize,
    /// Base seed; trial `k` uses `seed + k`. Drawn from entropy when `None`.
    pub seed: Option<u64>,
    pub mass_rel_std: f64,
    pub drag_coef_rel_std: f64,
    pub rr_coef_rel_std: f64,
    /// applied to motor, transmission, and inverter efficiency
    pub eff_rel_std: f64,
    /// applied to every auxiliary load
    pub aux_rel_std: f64,
    pub parallelize: bool,
}

impl Default for MonteCarlo {
    fn default() -> Self {
        Self {
            n_trials: 100,
            seed: None,
            mass_rel_std: 0.05,
            drag_coef_rel_std: 0.05,
            rr_coef_rel_std: 0.10,
            eff_rel_std: 0.02,
            aux_rel_std: 0.20,
            parallelize: true,
        }
    }
}

impl SerdeAPI for MonteCarlo {}

/// Summary statistics of one output metric across trials
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct Stats {
    pub mean: f64,
    pub std_dev: f64,
    pub p05: f64,
    pub p50: f64,
    pub p95: f64,
}

impl Stats {
    fn from_samples(mut samples: Vec<f64>) -> Self {
        let (mean, std_dev) = mean_std(&samples);
        samples.sort_by(|a, b| a.total_cmp(b));
        Self {
            mean,
            std_dev,
            p05: percentile_sorted(&samples, 5.0),
            p50: percentile_sorted(&samples, 50.0),
            p95: percentile_sorted(&samples, 95.0),
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct UncertaintySummary {
    pub n_trials: usize,
    pub range_km: Stats,
    pub kwh_per_100km: Stats,
}

impl SerdeAPI for UncertaintySummary {}

impl MonteCarlo {
    fn normal(rel_std: f64) -> anyhow::Result<Normal<f64>> {
        Normal::new(1.0, rel_std).map_err(|e| anyhow!("{e}: {}", format_dbg!(rel_std)))
    }

    /// Draws one perturbed copy of `base`
    pub fn perturb<R: Rng>(&self, base: &ParamSet, rng: &mut R) -> anyhow::Result<ParamSet> {
        let mut params = base.clone();
        let mut factor = |rel_std: f64| -> anyhow::Result<f64> {
            Ok(Self::normal(rel_std)?.sample(&mut *rng).max(MIN_FACTOR))
        };
        params.veh.veh_kg *= factor(self.mass_rel_std)?;
        params.veh.drag_coef *= factor(self.drag_coef_rel_std)?;
        params.veh.wheel_rr_coef *= factor(self.rr_coef_rel_std)?;
        let pt = &mut params.powertrain;
        pt.motor_eff = (pt.motor_eff * factor(self.eff_rel_std)?).min(1.0);
        pt.trans_eff = (pt.trans_eff * factor(self.eff_rel_std)?).min(1.0);
        pt.inverter_eff = (pt.inverter_eff * factor(self.eff_rel_std)?).min(1.0);
        let aux_factor = factor(self.aux_rel_std)?;
        params.aux.hvac_kw *= aux_factor;
        params.aux.electronics_kw *= aux_factor;
        params.aux.lighting_kw *= aux_factor;
        params.validate_all()?;
        Ok(params)
    }

    fn trial(
        &self,
        k: usize,
        base_seed: u64,
        base: &ParamSet,
        cyc: &DriveCycle,
        sim_params: &SimParams,
    ) -> anyhow::Result<SimResult> {
        let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(k as u64));
        let params = self.perturb(base, &mut rng)?;
        EnergyCalculator::with_sim_params(params, cyc.clone(), sim_params.clone())?.run()
    }

    /// Runs `n_trials` independent simulations of `cyc` with perturbed
    /// parameters and summarizes range and consumption
    pub fn run(
        &self,
        base: &ParamSet,
        cyc: &DriveCycle,
        sim_params: &SimParams,
    ) -> anyhow::Result<UncertaintySummary> {
        ensure!(self.n_trials > 0, "{}", format_dbg!(self.n_trials));
        for rel_std in [
            self.mass_rel_std,
            self.drag_coef_rel_std,
            self.rr_coef_rel_std,
            self.eff_rel_std,
            self.aux_rel_std,
        ] {
            Self::normal(rel_std)?;
        }
        let base_seed = match self.seed {
            Some(seed) => seed,
            None => StdRng::from_entropy().gen(),
        };
        let run_trial = |k: usize| {
            self.trial(k, base_seed, base, cyc, sim_params)
                .with_context(|| format!("Monte Carlo trial {k}"))
        };
        let results: Vec<SimResult> = if self.parallelize {
            (0..self.n_trials)
                .into_par_iter()
                .map(run_trial)
                .collect::<anyhow::Result<_>>()?
        } else {
            (0..self.n_trials)
                .map(run_trial)
                .collect::<anyhow::Result<_>>()?
        };

        let mut range_km = Vec::with_capacity(results.len());
        let mut kwh_per_100km = Vec::with_capacity(results.len());
        for (k, res) in results.iter().enumerate() {
            range_km.push(res.range_km().with_context(|| {
                format!(
                    "trial {k} has no distance-based range: {:?}; use a cycle that covers distance",
                    res.range
                )
            })?);
            kwh_per_100km.push(res.kwh_per_100km.with_context(|| format_dbg!(k))?);
        }
        Ok(UncertaintySummary {
            n_trials: self.n_trials,
            range_km: Stats::from_samples(range_km),
            kwh_per_100km: Stats::from_samples(kwh_per_100km),
        })
    }
}
