//! Quasi-static road load model.
//!
//! Every function here is a pure function of instantaneous scalars. Inputs are
//! assumed finite; parameter ranges are enforced when the [`ParamSet`](crate::params::ParamSet)
//! is validated, not here.

use crate::imports::*;
use crate::params::VehicleParams;

/// Aerodynamic drag \[N\], `0.5 ρ Cd A (v + v_wind)²`. Headwind is positive.
/// Zero at standstill regardless of wind; a tailwind faster than the vehicle
/// still yields a positive (resisting) force.
pub fn aero_drag_force(
    air_density_kg_per_m3: f64,
    drag_coef: f64,
    frontal_area_m2: f64,
    speed_mps: f64,
    wind_speed_mps: f64,
) -> f64 {
    if speed_mps == 0.0 {
        return 0.0;
    }
    0.5 * air_density_kg_per_m3 * drag_coef * frontal_area_m2 * (speed_mps + wind_speed_mps).powi(2)
}

/// Rolling resistance \[N\] for a given normal load \[N\] and grade angle \[rad\]
pub fn rolling_resistance_force(normal_load_n: f64, wheel_rr_coef: f64, grade_angle: f64) -> f64 {
    normal_load_n * wheel_rr_coef * grade_angle.cos()
}

/// Grade resistance \[N\]; negative downhill
pub fn grade_resistance_force(mass_kg: f64, a_grav_mps2: f64, grade_angle: f64) -> f64 {
    mass_kg * a_grav_mps2 * grade_angle.sin()
}

/// Inertial force \[N\]
pub fn accel_force(mass_kg: f64, accel_mps2: f64) -> f64 {
    mass_kg * accel_mps2
}

/// Tractive power \[W\]; positive for traction, negative for braking demand
pub fn tractive_power(force_n: f64, speed_mps: f64) -> f64 {
    force_n * speed_mps
}

/// Grade angle \[rad\] from grade expressed as rise over run
pub fn grade_angle(grade: f64) -> f64 {
    grade.atan()
}

/// Breakdown of the road load at one instant \[N\]
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct TractiveForces {
    pub aero_n: f64,
    pub rolling_n: f64,
    pub grade_n: f64,
    pub accel_n: f64,
    pub total_n: f64,
}

/// Road load model bound to a vehicle's parameters
#[derive(Clone, Copy, Debug)]
pub struct VehicleDynamics<'a> {
    veh: &'a VehicleParams,
}

impl<'a> VehicleDynamics<'a> {
    pub fn new(veh: &'a VehicleParams) -> Self {
        Self { veh }
    }

    pub fn aero_drag(&self, speed_mps: f64, wind_speed_mps: f64) -> f64 {
        aero_drag_force(
            self.veh.air_density_kg_per_m3,
            self.veh.drag_coef,
            self.veh.frontal_area_m2,
            speed_mps,
            wind_speed_mps,
        )
    }

    /// Rolling resistance with normal load `m g`, i.e. no load transfer
    pub fn rolling_resistance(&self, grade_angle: f64) -> f64 {
        rolling_resistance_force(
            self.veh.veh_kg * self.veh.a_grav_mps2,
            self.veh.wheel_rr_coef,
            grade_angle,
        )
    }

    pub fn grade_resistance(&self, grade_angle: f64) -> f64 {
        grade_resistance_force(self.veh.veh_kg, self.veh.a_grav_mps2, grade_angle)
    }

    pub fn accel_force(&self, accel_mps2: f64) -> f64 {
        accel_force(self.veh.veh_kg, accel_mps2)
    }

    /// Sum of aerodynamic, rolling, grade, and inertial forces; negative when
    /// the vehicle must brake
    pub fn total_tractive_force(
        &self,
        speed_mps: f64,
        accel_mps2: f64,
        grade_angle: f64,
        wind_speed_mps: f64,
    ) -> TractiveForces {
        let aero_n = self.aero_drag(speed_mps, wind_speed_mps);
        let rolling_n = self.rolling_resistance(grade_angle);
        let grade_n = self.grade_resistance(grade_angle);
        let accel_n = self.accel_force(accel_mps2);
        TractiveForces {
            aero_n,
            rolling_n,
            grade_n,
            accel_n,
            total_n: aero_n + rolling_n + grade_n + accel_n,
        }
    }
}
