use evsim_core::prelude::*;
use evsim_core::utils::{almost_eq, almost_ge, almost_le};
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const COMPACT_EV: &str = include_str!("assets/compact_ev.yaml");
const HILLY_COMMUTE: &str = include_str!("assets/hilly_commute.csv");

fn run(params: ParamSet, cyc: DriveCycle) -> (EnergyCalculator, SimResult) {
    let mut sd = EnergyCalculator::new(params, cyc).unwrap();
    sd.sim_drive().unwrap();
    let res = sd.result().cloned().unwrap();
    (sd, res)
}

#[test]
fn test_steady_state_matches_closed_form() {
    let params = ParamSet::from_yaml(COMPACT_EV).unwrap();
    for kmh in [30.0, 80.0, 130.0] {
        let (sd, _) = run(
            params.clone(),
            DriveCycle::constant_speed(kmh, 300.0, 1.0).unwrap(),
        );
        let veh = &params.veh;
        let v = kmh / 3.6;
        let expected_kw = v
            * (0.5 * veh.air_density_kg_per_m3 * veh.drag_coef * veh.frontal_area_m2 * v * v
                + veh.veh_kg * veh.a_grav_mps2 * veh.wheel_rr_coef)
            / 1e3;
        assert!(sd
            .history
            .tractive_kw
            .iter()
            .all(|p| almost_eq(*p, expected_kw, Some(1e-9))));
    }
}

#[test]
fn test_120_kmh_scenario() {
    let params = ParamSet::default();
    let (_, res) = run(
        params.clone(),
        DriveCycle::constant_speed(120.0, 3600.0, 1.0).unwrap(),
    );
    let v = 120.0 / 3.6;
    let aero_n = 0.5 * 1.2 * 0.28 * 2.3 * v * v;
    let rolling_n = 1800.0 * 9.81 * 0.010;
    let tractive_kw = v * (aero_n + rolling_n) / 1e3;
    assert!(almost_eq(res.distance_km, 120.0, Some(1e-9)));
    assert!(almost_eq(res.traction_wheel_kwh, tractive_kw, Some(1e-9)));
    let net_kwh = tractive_kw / params.powertrain.traction_eff() + 0.4;
    assert!(almost_eq(res.net_kwh, net_kwh, Some(1e-9)));
    assert!(almost_eq(
        res.kwh_per_100km.unwrap(),
        net_kwh / 120.0 * 100.0,
        Some(1e-9)
    ));
    assert!(almost_eq(
        res.range_km().unwrap(),
        70.0 / (net_kwh / 120.0),
        Some(1e-9)
    ));
    assert_eq!(res.regen_kwh, 0.0);
}

#[test]
fn test_coulomb_counting_scenario() {
    let soc = coulomb_counting(50.0, 3600.0, 1.0, 187.5, 0.99);
    assert!(almost_eq(soc, 0.736, Some(1e-12)));

    let mut battery_params = ParamSet::default().battery;
    battery_params.soc_max = 1.0;
    battery_params.soc_initial = 1.0;
    let mut battery = BatteryModel::new(battery_params);
    let update = battery.update_soc(50.0, 3600.0).unwrap();
    assert!(almost_eq(update.soc, 0.736, Some(1e-12)));
    assert_eq!(update.clamped, None);
}

#[test]
fn test_soc_non_increasing_without_regen() {
    // uphill acceleration then cruise, never braking
    let time_s: Vec<f64> = (0..=600).map(|t| t as f64).collect();
    let mps: Vec<f64> = time_s.iter().map(|t| (t * 0.5).min(30.0)).collect();
    let grade = vec![0.02; time_s.len()];
    let cyc = DriveCycle::new(time_s, mps)
        .unwrap()
        .with_grade(grade)
        .unwrap();
    let (sd, res) = run(ParamSet::default(), cyc);
    assert!(sd.history.tractive_kw.iter().all(|p| *p >= 0.0));
    assert!(res.soc.windows(2).all(|w| w[1] <= w[0]));
    assert_eq!(res.regen_kwh, 0.0);
    assert!(res.soc_final < ParamSet::default().battery.soc_initial);
}

#[test]
fn test_soc_stays_bounded_on_adversarial_cycles() {
    let mut rng = StdRng::seed_from_u64(1234);
    for trial in 0..20 {
        let n = rng.gen_range(2..400);
        let time_s: Vec<f64> = (0..n).map(|t| t as f64).collect();
        let mps: Vec<f64> = (0..n).map(|_| rng.gen_range(0.0..45.0)).collect();
        let grade: Vec<f64> = (0..n).map(|_| rng.gen_range(-0.4..0.4)).collect();
        let cyc = DriveCycle::new(time_s, mps)
            .unwrap()
            .with_grade(grade)
            .unwrap();

        let mut params = ParamSet::default();
        params.battery.nominal_capacity_kwh = rng.gen_range(0.5..5.0);
        params.battery.usable_capacity_kwh = params.battery.nominal_capacity_kwh * 0.9;
        params.battery.soc_initial =
            rng.gen_range(params.battery.soc_min..=params.battery.soc_max);
        params.powertrain.regen_max_kw = 500.0;
        let (_, res) = run(params, cyc);
        assert!(
            res.soc.iter().all(|soc| (0.0..=1.0).contains(soc)),
            "trial {trial}: {:?}",
            res.soc
        );
    }

    // long steep descent starting full
    let mut params = ParamSet::default();
    params.battery.nominal_capacity_kwh = 1.0;
    params.battery.usable_capacity_kwh = 0.9;
    params.powertrain.regen_max_kw = 1000.0;
    let cyc = DriveCycle::constant_speed(80.0, 1800.0, 1.0)
        .unwrap()
        .with_grade(vec![-0.3; 1801])
        .unwrap();
    let (_, res) = run(params.clone(), cyc);
    assert!(res
        .soc
        .iter()
        .all(|soc| almost_le(*soc, params.battery.soc_max, Some(1e-12))));

    // long steep climb from nearly empty
    params.battery.soc_initial = params.battery.soc_min;
    let cyc = DriveCycle::constant_speed(80.0, 1800.0, 1.0)
        .unwrap()
        .with_grade(vec![0.3; 1801])
        .unwrap();
    let (_, res) = run(params, cyc);
    assert!(res.soc_events.depleted);
    assert_eq!(res.soc_final, 0.0);
    assert!(res.soc.iter().all(|soc| *soc >= 0.0));
}

#[test]
fn test_energy_conservation_with_regen() {
    let params = ParamSet::from_yaml(COMPACT_EV).unwrap();
    let cycles = [
        DriveCycle::urban(1000.0, 1.0).unwrap(),
        DriveCycle::wltp_simplified(1800.0, 1.0).unwrap(),
        DriveCycle::from_csv_str(HILLY_COMMUTE, "hilly_commute".into()).unwrap(),
    ];
    for cyc in cycles {
        let (_, res) = run(params.clone(), cyc);
        assert!(res.regen_kwh > 0.0, "{}", res.cycle_name);
        assert!(almost_le(res.net_kwh, res.traction_kwh + res.aux_kwh, None));
        assert!(almost_le(
            res.regen_kwh,
            res.braking_wheel_kwh * params.powertrain.regen_eff,
            None
        ));
        assert!(res.friction_brake_kwh >= 0.0);
        // every braking kWh at the wheel goes to regen or friction
        assert!(almost_ge(
            res.regen_kwh / params.powertrain.regen_eff + res.friction_brake_kwh,
            res.braking_wheel_kwh,
            None
        ));
    }
}

#[test]
fn test_descent_at_full_charge_does_not_bank_energy() {
    // a full battery cannot store the descent, so the flat leg that follows
    // costs at least as much as it would on its own
    let params = ParamSet::default();
    let n = 1201;
    let time_s: Vec<f64> = (0..n).map(|t| t as f64).collect();
    let grade: Vec<f64> = (0..n).map(|i| if i <= 600 { -0.06 } else { 0.0 }).collect();
    let cyc = DriveCycle::new(time_s, vec![60.0 / 3.6; n])
        .unwrap()
        .with_grade(grade)
        .unwrap();
    let (_, mixed) = run(params.clone(), cyc);
    let (_, flat) = run(
        params,
        DriveCycle::constant_speed(60.0, 600.0, 1.0).unwrap(),
    );
    assert!(mixed.soc_events.n_soc_max_clamped > 0);
    assert!(almost_ge(mixed.net_kwh, flat.net_kwh, Some(1e-6)));
}

#[test]
fn test_range_factor_order_is_irrelevant() {
    let ra = RangeAdjuster::default();
    for ambient_c in [-15.0, 5.0, 21.5, 38.0] {
        let adj = ra.adjust(350.0, ambient_c, 0.93, 0.88).unwrap();
        let factors = [adj.f_temp, adj.f_terrain, adj.f_hvac, adj.f_traffic];
        for perm in factors.iter().permutations(factors.len()) {
            let adjusted = perm.into_iter().fold(350.0, |acc, f| acc * f);
            assert!(almost_eq(adjusted, adj.adjusted_range_km, Some(1e-12)));
        }
    }
}

#[test]
fn test_f_temp_peaks_at_optimum() {
    let ra = RangeAdjuster::default();
    let t_opt = ra.temp_optimal_c;
    let peak = ra.f_temp(t_opt);
    assert_eq!(peak, 1.0);
    let offsets: Vec<f64> = (1..=120).map(|i| i as f64 * 0.5).collect();
    for side in [-1.0, 1.0] {
        let vals: Vec<f64> = offsets.iter().map(|dt| ra.f_temp(t_opt + side * dt)).collect();
        assert!(vals[0] < peak);
        assert!(vals.windows(2).all(|w| w[1] < w[0]));
    }
}

#[test]
fn test_single_sample_cycle_is_rejected() {
    let cyc = DriveCycle::new(vec![0.0], vec![0.0]).unwrap();
    let err = EnergyCalculator::new(ParamSet::default(), cyc).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SimError>(),
        Some(SimError::InsufficientData(_))
    ));
}

#[test]
fn test_batch_over_cycles() {
    let params = ParamSet::from_yaml(COMPACT_EV).unwrap();
    let mut batch: SimBatch = [
        DriveCycle::urban(600.0, 1.0).unwrap(),
        DriveCycle::constant_speed(110.0, 900.0, 1.0).unwrap(),
        DriveCycle::from_csv_str(HILLY_COMMUTE, "hilly_commute".into()).unwrap(),
    ]
    .into_iter()
    .map(|cyc| EnergyCalculator::new(params.clone(), cyc).unwrap())
    .collect();
    batch.sim_drive(None).unwrap();
    let results = batch.results().unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.cycle_name.as_str()).collect();
    assert_eq!(names, ["urban", "constant_speed", "hilly_commute"]);
    // highway consumes more per km than urban for this vehicle
    assert!(results[1].kwh_per_km.unwrap() > results[0].kwh_per_km.unwrap());
}

#[test]
fn test_config_files() {
    let dir = tempfile::tempdir().unwrap();
    let params = ParamSet::from_yaml(COMPACT_EV).unwrap();
    assert!(matches!(params.battery.ocv, OcvCurve::Table(_)));

    let params_path = dir.path().join("compact_ev.yaml");
    params.to_file(&params_path).unwrap();
    assert_eq!(ParamSet::from_file(&params_path).unwrap(), params);
    #[cfg(feature = "bincode")]
    {
        let bin_path = dir.path().join("compact_ev.bin");
        params.to_file(&bin_path).unwrap();
        assert_eq!(ParamSet::from_file(&bin_path).unwrap(), params);
    }

    let cyc = DriveCycle::from_csv_str(HILLY_COMMUTE, "hilly_commute".into()).unwrap();
    let cyc_path = dir.path().join("hilly_commute.csv");
    cyc.to_file(&cyc_path).unwrap();
    assert_eq!(DriveCycle::from_csv_file(&cyc_path).unwrap(), cyc);

    let sim_params = SimParams::from_yaml("accel_scheme: Forward\nambient_temp_c: -5.0\n").unwrap();
    assert_eq!(sim_params.accel_scheme, DiffScheme::Forward);
    let cold = EnergyCalculator::with_sim_params(params.clone(), cyc.clone(), sim_params)
        .unwrap()
        .run()
        .unwrap();
    let mild = EnergyCalculator::new(params, cyc).unwrap().run().unwrap();
    // cabin heating follows ambient temperature
    assert!(cold.aux_kwh > mild.aux_kwh);
}

#[test]
fn test_invalid_params_report_every_field() {
    let mut params = ParamSet::from_yaml(COMPACT_EV).unwrap();
    params.veh.veh_kg = -1.0;
    params.powertrain.motor_eff = 1.5;
    params.battery.soc_initial = 0.99;
    let yaml = params.to_yaml().unwrap();
    let err = ParamSet::from_yaml(yaml).unwrap_err();
    let fields = err
        .chain()
        .find_map(|e| e.downcast_ref::<SimError>())
        .unwrap()
        .invalid_fields();
    assert_eq!(fields, ["motor_eff", "soc_initial", "veh_kg"]);
}
