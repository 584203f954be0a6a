//! Module containing the drive cycle: a time-ordered speed trace with optional road grade.

use crate::imports::*;
use crate::utils::MPS_PER_KMH;
use std::f64::consts::PI;

/// One row of a drive cycle, used for CSV (de)serialization
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct DriveCycleElement {
    /// time \[s\]
    #[serde(alias = "time")]
    pub time_s: f64,
    /// speed \[m/s\]
    #[serde(alias = "velocity")]
    pub mps: f64,
    /// grade \[rise/run\]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grade: Option<f64>,
}

/// Drive cycle: paired time and speed samples, read-only during simulation
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct DriveCycle {
    #[serde(default)]
    pub name: String,
    /// time \[s\], strictly increasing
    pub time_s: Array1<f64>,
    /// speed \[m/s\], non-negative
    pub mps: Array1<f64>,
    /// road grade \[rise/run\], zero when omitted
    #[serde(default)]
    pub grade: Array1<f64>,
}

impl SerdeAPI for DriveCycle {
    #[cfg(feature = "bincode")]
    const ACCEPTED_BYTE_FORMATS: &'static [&'static str] = &["yaml", "json", "bin", "csv"];
    #[cfg(not(feature = "bincode"))]
    const ACCEPTED_BYTE_FORMATS: &'static [&'static str] = &["yaml", "json", "csv"];
    const ACCEPTED_STR_FORMATS: &'static [&'static str] = &["yaml", "json", "csv"];

    fn init(&mut self) -> anyhow::Result<()> {
        if self.grade.is_empty() {
            self.grade = Array1::zeros(self.len());
        }
        self.init_checks()
    }

    fn to_writer<W: std::io::Write>(&self, wtr: W, format: &str) -> anyhow::Result<()> {
        match format.trim_start_matches('.').to_lowercase().as_str() {
            "yaml" | "yml" => serde_yaml::to_writer(wtr, self)?,
            "json" => serde_json::to_writer(wtr, self)?,
            #[cfg(feature = "bincode")]
            "bin" => bincode::serialize_into(wtr, self)?,
            "csv" => {
                let mut wtr = csv::Writer::from_writer(wtr);
                for i in 0..self.len() {
                    wtr.serialize(DriveCycleElement {
                        time_s: self.time_s[i],
                        mps: self.mps[i],
                        grade: Some(self.grade[i]),
                    })?;
                }
                wtr.flush()?
            }
            _ => bail!(
                "Unsupported format {format:?}, must be one of {:?}",
                Self::ACCEPTED_BYTE_FORMATS
            ),
        }
        Ok(())
    }

    fn to_str(&self, format: &str) -> anyhow::Result<String> {
        match format.trim_start_matches('.').to_lowercase().as_str() {
            "yaml" | "yml" => self.to_yaml(),
            "json" => self.to_json(),
            "csv" => self.to_csv(),
            _ => bail!(
                "Unsupported format {format:?}, must be one of {:?}",
                Self::ACCEPTED_STR_FORMATS
            ),
        }
    }

    /// Note that using this method to instantiate a DriveCycle from CSV, rather
    /// than the `from_csv_str` method, sets the cycle name to an empty string
    fn from_str<S: AsRef<str>>(contents: S, format: &str) -> anyhow::Result<Self> {
        match format.trim_start_matches('.').to_lowercase().as_str() {
            "yaml" | "yml" => Self::from_yaml(contents),
            "json" => Self::from_json(contents),
            "csv" => Self::from_reader(contents.as_ref().as_bytes(), "csv"),
            _ => bail!(
                "Unsupported format {format:?}, must be one of {:?}",
                Self::ACCEPTED_STR_FORMATS
            ),
        }
    }

    fn from_reader<R: std::io::Read>(rdr: R, format: &str) -> anyhow::Result<Self> {
        let mut deserialized = match format.trim_start_matches('.').to_lowercase().as_str() {
            "yaml" | "yml" => serde_yaml::from_reader(rdr)?,
            "json" => serde_json::from_reader(rdr)?,
            #[cfg(feature = "bincode")]
            "bin" => bincode::deserialize_from(rdr)?,
            "csv" => {
                let mut rdr = csv::Reader::from_reader(rdr);
                let mut elems: Vec<DriveCycleElement> = vec![];
                for result in rdr.deserialize() {
                    elems.push(result?);
                }
                Self::from_elements(&elems)
            }
            _ => bail!(
                "Unsupported format {format:?}, must be one of {:?}",
                Self::ACCEPTED_BYTE_FORMATS
            ),
        };
        deserialized.init()?;
        Ok(deserialized)
    }
}

impl DriveCycle {
    /// Builds and validates a flat-road cycle from time \[s\] and speed \[m/s\] samples
    pub fn new(time_s: Vec<f64>, mps: Vec<f64>) -> anyhow::Result<Self> {
        let mut cyc = Self {
            name: String::default(),
            time_s: Array1::from_vec(time_s),
            mps: Array1::from_vec(mps),
            grade: Array1::default(0),
        };
        cyc.init()?;
        Ok(cyc)
    }

    /// Replaces the road grade \[rise/run\] and revalidates
    pub fn with_grade(mut self, grade: Vec<f64>) -> anyhow::Result<Self> {
        self.grade = Array1::from_vec(grade);
        self.init_checks()?;
        Ok(self)
    }

    pub fn with_name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    fn from_elements(elems: &[DriveCycleElement]) -> Self {
        Self {
            name: String::default(),
            time_s: elems.iter().map(|e| e.time_s).collect(),
            mps: elems.iter().map(|e| e.mps).collect(),
            grade: elems.iter().map(|e| e.grade.unwrap_or(0.0)).collect(),
        }
    }

    /// Errors with [`SimError::InvalidCycle`] unless the cycle is non-empty,
    /// strictly increasing in time, non-negative in speed, finite, and of
    /// consistent length
    pub fn init_checks(&self) -> anyhow::Result<()> {
        let invalid = |msg: String| -> anyhow::Error { SimError::InvalidCycle(msg).into() };
        if self.is_empty() {
            return Err(invalid("cycle is empty".into()));
        }
        if !self.are_fields_equal_length() {
            return Err(invalid(format!(
                "unequal field lengths\ntime_s: {}\nmps: {}\ngrade: {}",
                self.time_s.len(),
                self.mps.len(),
                self.grade.len(),
            )));
        }
        if let Some(i) = self
            .time_s
            .iter()
            .chain(self.mps.iter())
            .chain(self.grade.iter())
            .position(|v| !v.is_finite())
        {
            return Err(invalid(format!("non-finite value at flattened index {i}")));
        }
        if let Some(i) = (1..self.len()).find(|&i| self.time_s[i] <= self.time_s[i - 1]) {
            return Err(invalid(format!(
                "time is not strictly increasing at index {i}: {} -> {}",
                self.time_s[i - 1],
                self.time_s[i]
            )));
        }
        if let Some(i) = self.mps.iter().position(|&v| v < 0.0) {
            return Err(invalid(format!(
                "negative speed {} m/s at index {i}",
                self.mps[i]
            )));
        }
        Ok(())
    }

    /// Load cycle from CSV file, parsing name from filepath
    pub fn from_csv_file<P: AsRef<Path>>(filepath: P) -> anyhow::Result<Self> {
        let filepath = filepath.as_ref();
        let name = filepath
            .file_stem()
            .and_then(OsStr::to_str)
            .with_context(|| format!("Could not parse cycle name from filepath: {filepath:?}"))?
            .to_string();
        let mut cyc = Self::from_file(filepath)?;
        cyc.name = name;
        Ok(cyc)
    }

    /// Load cycle from CSV string
    pub fn from_csv_str<S: AsRef<str>>(csv_str: S, name: String) -> anyhow::Result<Self> {
        let mut cyc = Self::from_str(csv_str, "csv")?;
        cyc.name = name;
        Ok(cyc)
    }

    /// Write (serialize) cycle to a CSV string
    pub fn to_csv(&self) -> anyhow::Result<String> {
        let mut buf = Vec::with_capacity(self.len());
        self.to_writer(&mut buf, "csv")?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn len(&self) -> usize {
        self.time_s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn are_fields_equal_length(&self) -> bool {
        self.mps.len() == self.len() && self.grade.len() == self.len()
    }

    /// Time step ending at sample `i`, `i >= 1`
    pub fn dt_s_at_i(&self, i: usize) -> f64 {
        self.time_s[i] - self.time_s[i - 1]
    }

    /// Time steps, zero at index 0
    pub fn dt_s(&self) -> Array1<f64> {
        (0..self.len())
            .map(|i| if i == 0 { 0.0 } else { self.dt_s_at_i(i) })
            .collect()
    }

    /// Distance covered in each time step, rectangular rule on the step-end speed
    pub fn dist_m(&self) -> Array1<f64> {
        &self.mps * &self.dt_s()
    }

    pub fn total_dist_km(&self) -> f64 {
        self.dist_m().sum() / 1e3
    }

    pub fn duration_s(&self) -> f64 {
        match self.len() {
            0 => 0.0,
            n => self.time_s[n - 1] - self.time_s[0],
        }
    }

    /// Distance-weighted average speed over the whole cycle \[m/s\]
    pub fn avg_speed_mps(&self) -> f64 {
        let duration_s = self.duration_s();
        if duration_s > 0.0 {
            self.dist_m().sum() / duration_s
        } else {
            0.0
        }
    }

    /// Sample times 0, dt, ..., duration
    fn time_grid(duration_s: f64, dt_s: f64) -> anyhow::Result<Array1<f64>> {
        ensure!(
            dt_s > 0.0 && dt_s.is_finite(),
            "time step must be finite and positive: {}",
            format_dbg!(dt_s)
        );
        ensure!(
            duration_s > 0.0 && duration_s.is_finite(),
            "duration must be finite and positive: {}",
            format_dbg!(duration_s)
        );
        let n = (duration_s / dt_s).round() as usize;
        Ok((0..=n).map(|i| i as f64 * dt_s).collect())
    }

    fn from_speed_fn<F: Fn(f64) -> f64>(
        name: &str,
        duration_s: f64,
        dt_s: f64,
        kmh_at: F,
    ) -> anyhow::Result<Self> {
        let time_s = Self::time_grid(duration_s, dt_s)?;
        let mps = time_s.mapv(|t| kmh_at(t).max(0.0) * MPS_PER_KMH);
        let mut cyc = Self {
            name: name.to_string(),
            time_s,
            mps,
            grade: Array1::default(0),
        };
        cyc.init()?;
        Ok(cyc)
    }

    /// Constant speed cycle, e.g. for highway range testing
    pub fn constant_speed(speed_kmh: f64, duration_s: f64, dt_s: f64) -> anyhow::Result<Self> {
        ensure!(
            speed_kmh >= 0.0 && speed_kmh.is_finite(),
            "speed must be finite and non-negative: {}",
            format_dbg!(speed_kmh)
        );
        Self::from_speed_fn("constant_speed", duration_s, dt_s, |_| speed_kmh)
    }

    /// Stop-and-go urban cycle built from 100 s segments: 20 s acceleration to
    /// 50 km/h, 40 s cruise, 20 s deceleration, and 20 s stopped
    pub fn urban(duration_s: f64, dt_s: f64) -> anyhow::Result<Self> {
        Self::from_speed_fn("urban", duration_s, dt_s, |t| {
            let t_seg = t % 100.0;
            if t_seg < 20.0 {
                t_seg / 20.0 * 50.0
            } else if t_seg < 60.0 {
                50.0
            } else if t_seg < 80.0 {
                50.0 - (t_seg - 60.0) / 20.0 * 50.0
            } else {
                0.0
            }
        })
    }

    /// Approximation of a four-phase standard cycle: each 600 s period cycles
    /// through low, medium, high, and extra-high speed sinusoids
    pub fn wltp_simplified(duration_s: f64, dt_s: f64) -> anyhow::Result<Self> {
        Self::from_speed_fn("wltp_simplified", duration_s, dt_s, |t| {
            let phase = (t % 600.0) / 600.0;
            let (mean_kmh, amp_kmh, start) = if phase < 0.25 {
                (20.0, 15.0, 0.0)
            } else if phase < 0.5 {
                (40.0, 20.0, 0.25)
            } else if phase < 0.75 {
                (60.0, 15.0, 0.5)
            } else {
                (80.0, 20.0, 0.75)
            };
            mean_kmh + amp_kmh * (2.0 * PI * (phase - start) * 4.0).sin()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::almost_eq;

    fn test_cyc() -> DriveCycle {
        DriveCycle::new(vec![0.0, 10.0, 30.0, 34.0, 40.0], vec![0.0, 10.0, 10.0, 0.0, 0.0]).unwrap()
    }

    #[test]
    fn test_dist() {
        let cyc = test_cyc();
        assert_eq!(cyc.dt_s(), array![0.0, 10.0, 20.0, 4.0, 6.0]);
        assert_eq!(cyc.dist_m(), array![0.0, 100.0, 200.0, 0.0, 0.0]);
        assert!(almost_eq(cyc.total_dist_km(), 0.3, None));
        assert_eq!(cyc.duration_s(), 40.0);
        assert!(almost_eq(cyc.avg_speed_mps(), 7.5, None));
        assert_eq!(cyc.grade, Array1::<f64>::zeros(5));
    }

    #[test]
    fn test_invalid_cycles() {
        let cases = [
            (vec![], vec![]),
            (vec![0.0, 1.0, 1.0], vec![0.0, 1.0, 2.0]),
            (vec![0.0, 2.0, 1.0], vec![0.0, 1.0, 2.0]),
            (vec![0.0, 1.0], vec![0.0, -1.0]),
            (vec![0.0, 1.0], vec![0.0]),
            (vec![0.0, f64::NAN], vec![0.0, 1.0]),
        ];
        for (time_s, mps) in cases {
            let err = DriveCycle::new(time_s.clone(), mps.clone()).unwrap_err();
            assert!(
                matches!(err.downcast_ref::<SimError>(), Some(SimError::InvalidCycle(_))),
                "{time_s:?} {mps:?}: {err}"
            );
        }
        assert!(test_cyc().with_grade(vec![0.0; 3]).is_err());
        assert!(test_cyc().with_grade(vec![0.01; 5]).is_ok());
    }

    #[test]
    fn test_single_sample_is_valid_cycle() {
        let cyc = DriveCycle::new(vec![0.0], vec![5.0]).unwrap();
        assert_eq!(cyc.len(), 1);
        assert_eq!(cyc.total_dist_km(), 0.0);
    }

    #[test]
    fn test_constant_speed() {
        let cyc = DriveCycle::constant_speed(120.0, 3600.0, 1.0).unwrap();
        assert_eq!(cyc.len(), 3601);
        assert!(almost_eq(cyc.total_dist_km(), 120.0, Some(1e-9)));
        assert!(DriveCycle::constant_speed(-1.0, 10.0, 1.0).is_err());
        assert!(DriveCycle::constant_speed(50.0, 10.0, 0.0).is_err());
    }

    #[test]
    fn test_urban() {
        let cyc = DriveCycle::urban(1400.0, 1.0).unwrap();
        assert_eq!(cyc.len(), 1401);
        assert_eq!(cyc.mps[0], 0.0);
        assert!(almost_eq(cyc.mps[10], 25.0 / 3.6, None));
        assert!(almost_eq(cyc.mps[40], 50.0 / 3.6, None));
        assert_eq!(cyc.mps[90], 0.0);
        assert!(cyc.mps.iter().all(|&v| (0.0..=50.0 / 3.6 + 1e-12).contains(&v)));
    }

    #[test]
    fn test_wltp_simplified() {
        let cyc = DriveCycle::wltp_simplified(1800.0, 1.0).unwrap();
        assert_eq!(cyc.len(), 1801);
        assert!(almost_eq(cyc.mps[0], 20.0 / 3.6, None));
        assert!(almost_eq(cyc.mps[150], 40.0 / 3.6, None));
        let max_kmh = cyc.mps.fold(0.0f64, |a, &b| a.max(b)) / MPS_PER_KMH;
        assert!(max_kmh <= 100.0 + 1e-9);
        assert!(cyc.mps.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_str_serde() {
        let cyc = test_cyc().with_grade(vec![0.0, 0.01, 0.02, 0.0, -0.01]).unwrap();
        for format in DriveCycle::ACCEPTED_STR_FORMATS {
            let s = cyc.to_str(format).unwrap();
            let de = DriveCycle::from_str(&s, format).unwrap();
            assert_eq!(de.time_s, cyc.time_s);
            assert_eq!(de.mps, cyc.mps);
            assert_eq!(de.grade, cyc.grade);
        }
    }

    #[test]
    fn test_csv_without_grade() {
        let csv_str = "time_s,mps\n0,0\n1,1.5\n2,3\n";
        let cyc = DriveCycle::from_csv_str(csv_str, "ramp".into()).unwrap();
        assert_eq!(cyc.name, "ramp");
        assert_eq!(cyc.mps, array![0.0, 1.5, 3.0]);
        assert_eq!(cyc.grade, array![0.0, 0.0, 0.0]);

        let bad_csv = "time_s,mps\n0,0\n0,1.5\n";
        assert!(DriveCycle::from_csv_str(bad_csv, "bad".into()).is_err());
    }

    #[test]
    fn test_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let cyc = DriveCycle::urban(200.0, 1.0).unwrap();
        let path = dir.path().join("urban_short.csv");
        cyc.to_file(&path).unwrap();
        let de = DriveCycle::from_csv_file(&path).unwrap();
        assert_eq!(de.name, "urban_short");
        assert_eq!(de.len(), cyc.len());
        assert!(almost_eq(de.total_dist_km(), cyc.total_dist_km(), Some(1e-9)));
    }
}
