//! 1-dimensional linear interpolation over a sorted table

use crate::imports::*;

/// Behavior for points outside the tabulated x-range
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq, Serialize)]
pub enum Extrapolate {
    /// Linear extrapolation from the two outermost points
    Extrapolate,
    /// Clamp to the nearest end value
    #[default]
    Clamp,
    /// Return an error
    Error,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Interp1D {
    pub x: Vec<f64>,
    pub f_x: Vec<f64>,
    #[serde(default)]
    pub extrapolate: Extrapolate,
}

impl Interp1D {
    /// Create and validate 1-D interpolator
    pub fn new(x: Vec<f64>, f_x: Vec<f64>, extrapolate: Extrapolate) -> anyhow::Result<Self> {
        let interp = Self { x, f_x, extrapolate };
        interp.validate()?;
        Ok(interp)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.x.len() >= 2,
            "At least 2 data points are required: x = {:?}",
            self.x
        );
        ensure!(
            self.x.len() == self.f_x.len(),
            "Supplied grid and values are not compatible shapes: {} vs {}",
            self.x.len(),
            self.f_x.len()
        );
        ensure!(
            self.x.iter().chain(self.f_x.iter()).all(|v| v.is_finite()),
            "Supplied table contains non-finite values"
        );
        ensure!(
            crate::utils::is_strictly_increasing(&self.x),
            "Supplied x-coordinates must be sorted and non-repeating"
        );
        Ok(())
    }

    /// Returns true if `f_x` never decreases as `x` increases
    pub fn is_monotonic(&self) -> bool {
        self.f_x.windows(2).all(|w| w[0] <= w[1])
    }

    pub fn x_min(&self) -> f64 {
        self.x[0]
    }

    pub fn x_max(&self) -> f64 {
        self.x[self.x.len() - 1]
    }

    /// Linearly interpolate at `point`
    pub fn interpolate(&self, point: f64) -> anyhow::Result<f64> {
        let n = self.x.len();
        if point < self.x_min() || point > self.x_max() {
            match self.extrapolate {
                Extrapolate::Clamp => {
                    return Ok(if point < self.x_min() {
                        self.f_x[0]
                    } else {
                        self.f_x[n - 1]
                    })
                }
                Extrapolate::Error => bail!(
                    "Attempted to interpolate at {point}, outside of [{}, {}]",
                    self.x_min(),
                    self.x_max()
                ),
                Extrapolate::Extrapolate => {
                    let i = if point < self.x_min() { 0 } else { n - 2 };
                    return Ok(self.lerp(i, point));
                }
            }
        }
        Ok(self.lerp(self.lower_index(point), point))
    }

    /// Index of the segment containing `point`, found by binary search
    fn lower_index(&self, point: f64) -> usize {
        // first index with x > point, minus one, kept inside [0, n - 2]
        let upper = self.x.partition_point(|&x| x <= point);
        upper.saturating_sub(1).min(self.x.len() - 2)
    }

    fn lerp(&self, i: usize, point: f64) -> f64 {
        let frac = (point - self.x[i]) / (self.x[i + 1] - self.x[i]);
        self.f_x[i] + frac * (self.f_x[i + 1] - self.f_x[i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(extrapolate: Extrapolate) -> Interp1D {
        Interp1D::new(
            vec![0., 1., 2., 3., 4.],
            vec![0.2, 0.4, 0.6, 0.8, 1.0],
            extrapolate,
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_args() {
        assert!(Interp1D::new(vec![0.], vec![1.], Extrapolate::Clamp).is_err());
        assert!(Interp1D::new(vec![0., 1.], vec![1.], Extrapolate::Clamp).is_err());
        assert!(Interp1D::new(vec![1., 0.], vec![1., 2.], Extrapolate::Clamp).is_err());
        assert!(Interp1D::new(vec![0., 0.], vec![1., 2.], Extrapolate::Clamp).is_err());
        assert!(Interp1D::new(vec![0., f64::NAN], vec![1., 2.], Extrapolate::Clamp).is_err());
    }

    #[test]
    fn test_linear() {
        let interp = table(Extrapolate::Error);
        assert_eq!(interp.interpolate(3.00).unwrap(), 0.8);
        assert!((interp.interpolate(3.75).unwrap() - 0.95).abs() < 1e-12);
        assert_eq!(interp.interpolate(4.00).unwrap(), 1.0);
        assert_eq!(interp.interpolate(0.00).unwrap(), 0.2);
        assert!(interp.interpolate(4.5).is_err());
    }

    #[test]
    fn test_extrapolate() {
        let clamp = table(Extrapolate::Clamp);
        assert_eq!(clamp.interpolate(-1.).unwrap(), 0.2);
        assert_eq!(clamp.interpolate(5.).unwrap(), 1.0);
        let extrap = table(Extrapolate::Extrapolate);
        assert!((extrap.interpolate(-1.).unwrap() - 0.0).abs() < 1e-12);
        assert!((extrap.interpolate(5.).unwrap() - 1.2).abs() < 1e-12);
    }

    #[test]
    fn test_monotonic() {
        assert!(table(Extrapolate::Clamp).is_monotonic());
        let bumpy = Interp1D::new(vec![0., 1., 2.], vec![1., 0.5, 2.], Extrapolate::Clamp).unwrap();
        assert!(!bumpy.is_monotonic());
    }
}
