//! Stepping and post-processing for [`EnergyCalculator`]

use super::*;
use crate::battery::SocBound;
use crate::dynamics::{grade_angle, tractive_power, VehicleDynamics};
use crate::utils::{ensure_finite, S_PER_H};

/// Acceleration \[m/s²\] at every sample of `cyc` by finite difference.
/// Errors with [`SimError::InsufficientData`] if `cyc` has fewer than 2 samples.
pub fn accel_mps2(cyc: &DriveCycle, scheme: DiffScheme) -> anyhow::Result<Array1<f64>> {
    let n = cyc.len();
    if n < 2 {
        return Err(SimError::InsufficientData(format!(
            "drive cycle {:?} has {} sample(s); differencing needs at least 2",
            cyc.name, n
        ))
        .into());
    }
    let (t, v) = (&cyc.time_s, &cyc.mps);
    let forward = |i: usize| (v[i + 1] - v[i]) / (t[i + 1] - t[i]);
    let backward = |i: usize| (v[i] - v[i - 1]) / (t[i] - t[i - 1]);
    Ok((0..n)
        .map(|i| {
            if i == 0 {
                forward(0)
            } else if i == n - 1 {
                backward(i)
            } else {
                match scheme {
                    DiffScheme::Forward => forward(i),
                    DiffScheme::Backward => backward(i),
                    DiffScheme::Central => (v[i + 1] - v[i - 1]) / (t[i + 1] - t[i - 1]),
                }
            }
        })
        .collect())
}

impl EnergyCalculator {
    /// Resets per-run state so that `sim_drive` can be called repeatedly
    fn init_for_step(&mut self) -> anyhow::Result<()> {
        self.battery = BatteryModel::new(self.params.battery.clone());
        self.accel_mps2 = accel_mps2(&self.cyc, self.sim_params.accel_scheme)?;
        self.aux_kw = self.params.aux.total_kw(self.sim_params.ambient_temp_c);
        self.history = SimStateHistoryVec::with_capacity(self.cyc.len());
        self.totals = EnergyTotals::default();
        self.soc_events = SocBoundEvents::default();
        self.n_peak_power_exceeded = 0;
        self.result = None;
        self.i = 0;
        ensure_finite(self.aux_kw, "auxiliary power", 0)?;
        Ok(())
    }

    /// Runs the full drive cycle, populating `history` and the result
    pub fn sim_drive(&mut self) -> anyhow::Result<()> {
        self.init_for_step()?;
        self.walk()?;
        self.set_post_scalars()
    }

    /// Steps through the cycle in time order. Step 0 records the initial
    /// state; each later step integrates over the interval ending at it.
    pub fn walk(&mut self) -> anyhow::Result<()> {
        while self.i < self.cyc.len() {
            self.step()
                .with_context(|| format!("{} at step {}", format_dbg!(self.cyc.name), self.i))?;
        }
        Ok(())
    }

    pub fn step(&mut self) -> anyhow::Result<()> {
        self.solve_step(self.i)?;
        self.history.push(&self.state);
        self.i += 1;
        Ok(())
    }

    /// Computes the state at sample `i`
    pub fn solve_step(&mut self, i: usize) -> anyhow::Result<()> {
        self.set_road_load(i)?;
        self.set_power_routing(i)?;
        self.set_battery(i)?;
        if i > 0 {
            self.accumulate(i);
        }
        Ok(())
    }

    /// Road load forces and tractive power at sample `i`
    fn set_road_load(&mut self, i: usize) -> anyhow::Result<()> {
        let speed_mps = self.cyc.mps[i];
        let accel_mps2 = ensure_finite(self.accel_mps2[i], "acceleration", i)?;
        let forces = VehicleDynamics::new(&self.params.veh).total_tractive_force(
            speed_mps,
            accel_mps2,
            grade_angle(self.cyc.grade[i]),
            self.sim_params.wind_speed_mps,
        );
        let tractive_kw = tractive_power(forces.total_n, speed_mps) / 1e3;
        self.state = SimState {
            i,
            time_s: self.cyc.time_s[i],
            speed_mps,
            accel_mps2,
            forces,
            tractive_kw: ensure_finite(tractive_kw, "tractive power", i)?,
            soc: self.battery.soc(),
            ..Default::default()
        };
        Ok(())
    }

    /// Sign-based routing of wheel power to the battery. Traction draws
    /// `P / η_traction` plus auxiliaries; braking recovers
    /// `min(|P| η_regen, P_regen_max · taper(soc))` and leaves the remainder to
    /// the friction brakes.
    fn set_power_routing(&mut self, i: usize) -> anyhow::Result<()> {
        let pt = &self.params.powertrain;
        let tractive_kw = self.state.tractive_kw;
        if tractive_kw >= 0.0 {
            if tractive_kw > pt.motor_peak_kw {
                if self.n_peak_power_exceeded == 0 {
                    #[cfg(feature = "logging")]
                    log::warn!(
                        "{:?}: tractive power {:.1} kW exceeds motor peak {:.1} kW at step {}",
                        self.cyc.name,
                        tractive_kw,
                        pt.motor_peak_kw,
                        i
                    );
                }
                self.n_peak_power_exceeded += 1;
            }
            self.state.battery_kw = tractive_kw / pt.traction_eff() + self.aux_kw;
        } else {
            let braking_kw = -tractive_kw;
            let regen_eff = self.regen_eff();
            let regen_limit_kw = pt.regen_max_kw * self.sim_params.regen_taper(self.battery.soc());
            let regen_kw = (braking_kw * regen_eff).min(regen_limit_kw);
            self.state.regen_kw = regen_kw;
            self.state.friction_brake_kw = (braking_kw - regen_kw / regen_eff).max(0.0);
            self.state.battery_kw = self.aux_kw - regen_kw;
        }
        ensure_finite(self.state.battery_kw, "battery power", i)?;
        Ok(())
    }

    /// Efficiency from braking power at the wheels to regenerative charging power
    fn regen_eff(&self) -> f64 {
        let pt = &self.params.powertrain;
        match self.sim_params.regen_eff_basis {
            RegenEffBasis::Regen => pt.regen_eff,
            RegenEffBasis::FullPath => pt.regen_path_eff(),
        }
    }

    /// Current, terminal voltage, and resistive loss for the present battery power
    fn set_battery_electrics(&mut self, i: usize, soc: f64) -> anyhow::Result<()> {
        let temp_c = self.sim_params.ambient_temp_c;
        let current_a = ensure_finite(
            self.state.battery_kw * 1e3 / self.params.battery.nominal_voltage_v,
            "battery current",
            i,
        )?;
        self.state.current_a = current_a;
        self.state.terminal_voltage_v = ensure_finite(
            self.battery.terminal_voltage(soc, current_a, temp_c)?,
            "terminal voltage",
            i,
        )?;
        self.state.battery_loss_kw = self.battery.power_loss(current_a, temp_c) / 1e3;
        Ok(())
    }

    /// Battery current, voltage, and losses at sample `i`, then the SOC update
    /// over the interval ending at `i`. Charge that would lift SOC above
    /// `soc_max` is not absorbed: it is removed from regeneration and left to
    /// the friction brakes.
    fn set_battery(&mut self, i: usize) -> anyhow::Result<()> {
        let soc_prev = self.battery.soc();
        self.set_battery_electrics(i, soc_prev)?;
        let current_a = self.state.current_a;

        if i > 0 {
            let dt_s = self.cyc.dt_s_at_i(i);
            let update = self.battery.update_soc(current_a, dt_s)?;
            if let Some(SocBound::Empty) = update.clamped {
                if !self.soc_events.depleted {
                    #[cfg(feature = "logging")]
                    log::warn!(
                        "{:?}: battery depleted at step {} (t = {} s), SOC clamped at 0",
                        self.cyc.name,
                        i,
                        self.cyc.time_s[i]
                    );
                    self.soc_events.depleted = true;
                    self.soc_events.first_depleted_i = Some(i);
                }
            }
            let excess_soc = if current_a < 0.0 {
                self.battery.cap_at_soc_max() + (update.unclamped - update.soc).max(0.0)
            } else {
                0.0
            };
            if excess_soc > 0.0 {
                let rejected_kw = self
                    .battery
                    .soc_delta_to_kw(excess_soc, dt_s)
                    .min(self.state.regen_kw);
                self.state.regen_kw -= rejected_kw;
                self.state.friction_brake_kw += rejected_kw / self.regen_eff();
                self.state.battery_kw += rejected_kw;
                self.set_battery_electrics(i, soc_prev)?;
                if self.soc_events.n_soc_max_clamped == 0 {
                    #[cfg(feature = "logging")]
                    log::warn!(
                        "{:?}: regeneration capped at soc_max = {} at step {}",
                        self.cyc.name,
                        self.params.battery.soc_max,
                        i
                    );
                }
                self.soc_events.n_soc_max_clamped += 1;
            }
            if self.battery.soc() < self.params.battery.soc_min
                && self.soc_events.first_below_soc_min_i.is_none()
            {
                self.soc_events.first_below_soc_min_i = Some(i);
            }
        }
        self.state.soc = ensure_finite(self.battery.soc(), "state of charge", i)?;
        Ok(())
    }

    /// Rectangular (Euler) integration of the interval ending at sample `i`
    fn accumulate(&mut self, i: usize) {
        let dt_h = self.cyc.dt_s_at_i(i) / S_PER_H;
        let state = &self.state;
        let totals = &mut self.totals;
        totals.dist_m += state.speed_mps * dt_h * S_PER_H;
        if state.tractive_kw >= 0.0 {
            totals.traction_wheel_kwh += state.tractive_kw * dt_h;
            totals.traction_kwh += state.tractive_kw / self.params.powertrain.traction_eff() * dt_h;
        } else {
            totals.braking_wheel_kwh += -state.tractive_kw * dt_h;
            totals.regen_kwh += state.regen_kw * dt_h;
            totals.friction_brake_kwh += state.friction_brake_kw * dt_h;
        }
        totals.aux_kwh += self.aux_kw * dt_h;
        totals.battery_loss_kwh += state.battery_loss_kw * dt_h;
    }

    /// Aggregates totals into a [`SimResult`]
    pub fn set_post_scalars(&mut self) -> anyhow::Result<()> {
        let n = self.cyc.len();
        let totals = self.totals;
        let gross_kwh = totals.traction_kwh + totals.aux_kwh;
        let mut net_kwh = ensure_finite(gross_kwh - totals.regen_kwh, "net energy", n - 1)?;
        if net_kwh < 0.0 {
            #[cfg(feature = "logging")]
            log::warn!(
                "{:?}: regenerated energy {:.4} kWh exceeds traction and auxiliary energy {:.4} kWh, net energy floored at 0",
                self.cyc.name,
                totals.regen_kwh,
                gross_kwh
            );
            net_kwh = 0.0;
        }
        let distance_km = ensure_finite(totals.dist_m / 1e3, "distance", n - 1)?;
        let duration_s = self.cyc.duration_s();
        let usable_kwh = self.params.battery.usable_capacity_kwh;

        let kwh_per_km = if distance_km > 0.0 {
            Some(ensure_finite(net_kwh / distance_km, "energy per distance", n - 1)?)
        } else {
            None
        };
        let range = match kwh_per_km {
            Some(e) if e > 0.0 => RangeEstimate::Distance(usable_kwh / e),
            Some(_) => RangeEstimate::Unbounded,
            None if net_kwh > 0.0 => RangeEstimate::Stationary {
                hours_to_depletion: usable_kwh / (net_kwh / (duration_s / S_PER_H)),
            },
            None => RangeEstimate::Unbounded,
        };
        let soc_final = self.battery.soc();
        let remaining_range_km = kwh_per_km.filter(|&e| e > 0.0).map(|e| {
            (soc_final - self.params.battery.soc_min).max(0.0) * usable_kwh / e
        });

        let result = SimResult {
            cycle_name: self.cyc.name.clone(),
            distance_km,
            duration_s,
            traction_kwh: totals.traction_kwh,
            traction_wheel_kwh: totals.traction_wheel_kwh,
            braking_wheel_kwh: totals.braking_wheel_kwh,
            aux_kwh: totals.aux_kwh,
            regen_kwh: totals.regen_kwh,
            friction_brake_kwh: totals.friction_brake_kwh,
            battery_loss_kwh: totals.battery_loss_kwh,
            net_kwh,
            kwh_per_km,
            kwh_per_100km: kwh_per_km.map(|e| e * 100.0),
            range,
            remaining_range_km,
            soc: self.history.soc.clone(),
            soc_final,
            soc_events: self.soc_events.clone(),
            n_peak_power_exceeded: self.n_peak_power_exceeded,
        };
        #[cfg(feature = "logging")]
        log::debug!(
            "{:?}: {:.3} km, net {:.4} kWh, range {:?}, final SOC {:.4}",
            result.cycle_name,
            result.distance_km,
            result.net_kwh,
            result.range,
            result.soc_final
        );
        self.result = Some(result);
        Ok(())
    }
}
