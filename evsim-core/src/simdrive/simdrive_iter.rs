//! Module containing a collection of independent calculators with parallel
//! and serial batch running of `sim_drive`

use super::{EnergyCalculator, SimResult};
use crate::imports::*;
use rayon::prelude::*;

/// Independent simulation runs, e.g. one vehicle over several drive cycles
#[derive(Clone, Debug, Default)]
pub struct SimBatch(pub Vec<EnergyCalculator>);

impl SimBatch {
    /// Calls `sim_drive` method for each calculator in the batch.
    /// # Arguments:
    /// * parallelize: whether to parallelize `sim_drive` calls, defaults to `true`
    pub fn sim_drive(&mut self, parallelize: Option<bool>) -> anyhow::Result<()> {
        let parallelize = parallelize.unwrap_or(true);
        if parallelize {
            self.0.par_iter_mut().enumerate().try_for_each(|(i, sd)| {
                sd.sim_drive()
                    .with_context(|| format!("simdrive idx: {}", i))
            })?;
        } else {
            self.0.iter_mut().enumerate().try_for_each(|(i, sd)| {
                sd.sim_drive()
                    .with_context(|| format!("simdrive idx: {}", i))
            })?;
        }
        Ok(())
    }

    /// Results in batch order; errors if any run has not completed
    pub fn results(&self) -> anyhow::Result<Vec<&SimResult>> {
        self.0
            .iter()
            .enumerate()
            .map(|(i, sd)| {
                sd.result()
                    .with_context(|| format!("simdrive idx {} has not been run", i))
            })
            .collect()
    }

    pub fn push(&mut self, sd: EnergyCalculator) {
        self.0.push(sd);
    }

    pub fn pop(&mut self) -> Option<EnergyCalculator> {
        self.0.pop()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<EnergyCalculator> for SimBatch {
    fn from_iter<I: IntoIterator<Item = EnergyCalculator>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
