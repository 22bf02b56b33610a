//! Two-dimensional signal-strength map over pointing angles
//!
//! Samples are stored on an equally spaced azimuth/elevation grid in row-major order (one row per
//! elevation). Writes snap to the nearest grid point; reads interpolate bilinearly between the
//! four enclosing grid points.

use crate::Error;

/// Largest number of grid points in a map
pub const MAX_MAP_POINTS: usize = 1 << 22;

/// Relative slack allowed at the map edges before a position counts as out of range
const EDGE_TOLERANCE: f64 = 1e-9;

/// Signal-strength map on a rectangular grid
#[derive(Clone, PartialEq, Debug)]
pub struct SignalMap {
    /// Number of azimuth samples
    az_samples: usize,
    /// Number of elevation samples
    el_samples: usize,
    /// Smallest azimuth (rad)
    az_min: f64,
    /// Smallest elevation (rad)
    el_min: f64,
    /// Azimuth grid spacing (rad)
    az_resolution: f64,
    /// Elevation grid spacing (rad)
    el_resolution: f64,
    /// Samples, element `el * az_samples + az`
    data: Vec<f64>,
    /// Number of writes since creation or the last clear
    num_writes: usize,
}

impl SignalMap {
    /// Returns empty map centered on given angles.
    ///
    /// # Parameters
    ///
    /// - `center_az`, `center_el`: Angles at the center of the map (rad).
    ///
    /// - `dims`: Number of azimuth and elevation samples, each at least 2.
    ///
    /// - `ranges`: Total azimuth and elevation spans (rad), each positive.
    ///
    /// # Errors
    ///
    /// Returns an error if a dimension is less than 2, if a range is not positive, or if the grid
    /// would exceed [`MAX_MAP_POINTS`] points.
    ///
    /// # Examples
    ///
    /// ```
    /// use fsolink::signal_map::SignalMap;
    ///
    /// let mut map = SignalMap::new(0.0, 0.0, (3, 3), (2.0, 2.0))?;
    /// map.set(1.0, 0.0, 4.0)?;
    /// assert_eq!(map.get(0.5, 0.0)?, 2.0);
    /// assert!(map.get(1.5, 0.0).is_err());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(
        center_az: f64,
        center_el: f64,
        dims: (usize, usize),
        ranges: (f64, f64),
    ) -> Result<Self, Error> {
        let (az_samples, el_samples) = dims;
        let (az_range, el_range) = ranges;
        if az_samples < 2 || el_samples < 2 {
            return Err(Error::InvalidParam(format!(
                "Signal map needs at least 2 samples per axis (found {az_samples} x {el_samples})"
            )));
        }
        if !(az_range.is_finite() && az_range > 0.0 && el_range.is_finite() && el_range > 0.0) {
            return Err(Error::InvalidParam(format!(
                "Signal map ranges must be positive (found {az_range} x {el_range})"
            )));
        }
        if !(center_az.is_finite() && center_el.is_finite()) {
            return Err(Error::InvalidParam("Signal map center must be finite".to_string()));
        }
        let num_points = az_samples
            .checked_mul(el_samples)
            .filter(|&len| len <= MAX_MAP_POINTS)
            .ok_or_else(|| {
                Error::ResourceExhausted(format!(
                    "Signal map of {az_samples} x {el_samples} points exceeds {MAX_MAP_POINTS} \
                     points"
                ))
            })?;
        Ok(Self {
            az_samples,
            el_samples,
            az_min: center_az - az_range / 2.0,
            el_min: center_el - el_range / 2.0,
            az_resolution: az_range / (az_samples - 1) as f64,
            el_resolution: el_range / (el_samples - 1) as f64,
            data: vec![0.0; num_points],
            num_writes: 0,
        })
    }

    /// Returns number of azimuth and elevation samples.
    #[must_use]
    pub fn dims(&self) -> (usize, usize) {
        (self.az_samples, self.el_samples)
    }

    /// Returns azimuth and elevation grid spacings (rad).
    #[must_use]
    pub fn resolution(&self) -> (f64, f64) {
        (self.az_resolution, self.el_resolution)
    }

    /// Returns azimuth and elevation spans (rad).
    #[must_use]
    pub fn ranges(&self) -> (f64, f64) {
        (
            self.az_resolution * (self.az_samples - 1) as f64,
            self.el_resolution * (self.el_samples - 1) as f64,
        )
    }

    /// Returns angles at the center of the map (rad).
    #[must_use]
    pub fn center(&self) -> (f64, f64) {
        let (az_range, el_range) = self.ranges();
        (self.az_min + az_range / 2.0, self.el_min + el_range / 2.0)
    }

    /// Returns number of writes since creation or the last clear.
    #[must_use]
    pub fn num_writes(&self) -> usize {
        self.num_writes
    }

    /// Returns samples in row-major order (one row per elevation).
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Returns `true` if the given angles lie inside the map.
    #[must_use]
    pub fn contains(&self, az: f64, el: f64) -> bool {
        self.fractional_index(az, el).is_some()
    }

    /// Returns angles of a grid point.
    #[must_use]
    pub fn position(&self, az_index: usize, el_index: usize) -> (f64, f64) {
        (
            self.az_min + az_index as f64 * self.az_resolution,
            self.el_min + el_index as f64 * self.el_resolution,
        )
    }

    /// Stores a sample at the grid point nearest to the given angles.
    ///
    /// # Errors
    ///
    /// Returns an error if the angles lie outside the map.
    pub fn set(&mut self, az: f64, el: f64, value: f64) -> Result<(), Error> {
        let (fx, fy) = self.checked_fractional_index(az, el)?;
        self.store(fx, fy, value);
        Ok(())
    }

    /// Stores a sample like [`SignalMap::set`] if the angles lie inside the map, returning whether
    /// it was stored.
    pub fn set_if_inside(&mut self, az: f64, el: f64, value: f64) -> bool {
        match self.fractional_index(az, el) {
            Some((fx, fy)) => {
                self.store(fx, fy, value);
                true
            }
            None => false,
        }
    }

    /// Returns bilinear interpolation of the samples at the given angles.
    ///
    /// # Errors
    ///
    /// Returns an error if the angles lie outside the map.
    pub fn get(&self, az: f64, el: f64) -> Result<f64, Error> {
        let (fx, fy) = self.checked_fractional_index(az, el)?;
        let (i, j) = (floor_index(fx, self.az_samples), floor_index(fy, self.el_samples));
        let (tx, ty) = (fx - i as f64, fy - j as f64);
        let at = |i: usize, j: usize| self.data[j * self.az_samples + i];
        Ok((1.0 - tx) * (1.0 - ty) * at(i, j)
            + tx * (1.0 - ty) * at(i + 1, j)
            + (1.0 - tx) * ty * at(i, j + 1)
            + tx * ty * at(i + 1, j + 1))
    }

    /// Returns angles and value of the largest sample (the first one on ties).
    ///
    /// # Errors
    ///
    /// Returns an error if no sample has been written yet.
    pub fn peak(&self) -> Result<(f64, f64, f64), Error> {
        if self.num_writes == 0 {
            return Err(Error::NotInitialized(
                "Signal map has no samples".to_string(),
            ));
        }
        let (index, value) = self
            .data
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (index, value)| {
                if value > best.1 {
                    (index, value)
                } else {
                    best
                }
            });
        let (az, el) = self.position(index % self.az_samples, index / self.az_samples);
        Ok((az, el, value))
    }

    /// Clears all samples.
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.num_writes = 0;
    }

    /// Moves the map center to the given angles and clears all samples.
    pub fn recenter(&mut self, center_az: f64, center_el: f64) {
        let (az_range, el_range) = self.ranges();
        self.az_min = center_az - az_range / 2.0;
        self.el_min = center_el - el_range / 2.0;
        self.clear();
    }

    /// Returns fractional grid indices of the given angles, or `None` if they are out of range.
    fn fractional_index(&self, az: f64, el: f64) -> Option<(f64, f64)> {
        let fx = (az - self.az_min) / self.az_resolution;
        let fy = (el - self.el_min) / self.el_resolution;
        let inside = |f: f64, samples: usize| {
            f >= -EDGE_TOLERANCE && f <= (samples - 1) as f64 + EDGE_TOLERANCE
        };
        (inside(fx, self.az_samples) && inside(fy, self.el_samples)).then_some((fx, fy))
    }

    /// Writes a sample at the grid point nearest to in-range fractional indices.
    fn store(&mut self, fx: f64, fy: f64, value: f64) {
        let (i, j) = (round_index(fx, self.az_samples), round_index(fy, self.el_samples));
        self.data[j * self.az_samples + i] = value;
        self.num_writes += 1;
    }

    /// Returns fractional grid indices of the given angles, or an error if they are out of range.
    fn checked_fractional_index(&self, az: f64, el: f64) -> Result<(f64, f64), Error> {
        self.fractional_index(az, el).ok_or_else(|| {
            Error::InvalidParam(format!("Position ({az}, {el}) lies outside the signal map"))
        })
    }
}

/// Returns nearest grid index for an in-range fractional index.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_index(f: f64, samples: usize) -> usize {
    (f.round().max(0.0) as usize).min(samples - 1)
}

/// Returns index of the lower enclosing grid point for an in-range fractional index.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn floor_index(f: f64, samples: usize) -> usize {
    (f.floor().max(0.0) as usize).min(samples - 2)
}

#[cfg(test)]
mod tests_of_signal_map {
    use float_eq::assert_float_eq;

    use super::*;

    fn ramp_map() -> SignalMap {
        // Value equal to az + 10 el at every grid point
        let mut map = SignalMap::new(0.0, 0.0, (5, 3), (4.0, 2.0)).unwrap();
        for j in 0 .. 3 {
            for i in 0 .. 5 {
                let (az, el) = map.position(i, j);
                map.set(az, el, az + 10.0 * el).unwrap();
            }
        }
        map
    }

    #[test]
    fn test_new() {
        assert!(SignalMap::new(0.0, 0.0, (1, 5), (1.0, 1.0)).is_err());
        assert!(SignalMap::new(0.0, 0.0, (5, 5), (0.0, 1.0)).is_err());
        assert!(SignalMap::new(0.0, 0.0, (5, 5), (1.0, f64::NAN)).is_err());
        assert!(matches!(
            SignalMap::new(0.0, 0.0, (1 << 12, 1 << 12), (1.0, 1.0)),
            Err(Error::ResourceExhausted(_))
        ));
        let map = SignalMap::new(0.1, -0.2, (11, 21), (1.0, 2.0)).unwrap();
        assert_eq!(map.dims(), (11, 21));
        let (az_res, el_res) = map.resolution();
        assert_float_eq!(az_res, 0.1, abs <= 1e-15);
        assert_float_eq!(el_res, 0.1, abs <= 1e-15);
        let (az, el) = map.center();
        assert_float_eq!(az, 0.1, abs <= 1e-12);
        assert_float_eq!(el, -0.2, abs <= 1e-12);
        assert_eq!(map.data().len(), 231);
    }

    #[test]
    fn test_set_snaps_to_nearest() {
        let mut map = SignalMap::new(0.0, 0.0, (5, 5), (4.0, 4.0)).unwrap();
        map.set(0.4, -0.6, 7.0).unwrap();
        // Nearest grid point is (0, -1), i.e. column 2 of row 1
        assert_float_eq!(map.data()[5 + 2], 7.0, abs <= 0.0);
        assert_eq!(map.num_writes(), 1);
        assert!(map.set(2.5, 0.0, 1.0).is_err());
        assert_eq!(map.num_writes(), 1);
        assert!(!map.set_if_inside(0.0, -2.5, 1.0));
        assert_eq!(map.num_writes(), 1);
        assert!(map.set_if_inside(-1.8, 1.9, 3.0));
        assert_float_eq!(map.data()[4 * 5], 3.0, abs <= 0.0);
        assert_eq!(map.num_writes(), 2);
    }

    #[test]
    fn test_get_is_bilinear() {
        let map = ramp_map();
        // A bilinear interpolant reproduces a linear function exactly
        for &(az, el) in &[(0.0, 0.0), (-2.0, -1.0), (2.0, 1.0), (0.3, 0.7), (-1.25, -0.4)] {
            assert_float_eq!(map.get(az, el).unwrap(), az + 10.0 * el, abs <= 1e-12);
        }
        assert!(map.get(2.01, 0.0).is_err());
        assert!(map.get(0.0, -1.01).is_err());
    }

    #[test]
    fn test_peak() {
        let mut map = SignalMap::new(0.0, 0.0, (5, 5), (4.0, 4.0)).unwrap();
        assert!(matches!(map.peak(), Err(Error::NotInitialized(_))));
        map.set(1.0, -1.0, 3.0).unwrap();
        map.set(-1.0, 2.0, 3.0).unwrap();
        map.set(0.0, 0.0, 2.0).unwrap();
        let (az, el, value) = map.peak().unwrap();
        assert_float_eq!(az, 1.0, abs <= 1e-12);
        assert_float_eq!(el, -1.0, abs <= 1e-12);
        assert_float_eq!(value, 3.0, abs <= 0.0);
    }

    #[test]
    fn test_negative_peak() {
        let mut map = SignalMap::new(0.0, 0.0, (2, 2), (1.0, 1.0)).unwrap();
        for &(az, el) in &[(-0.5, -0.5), (0.5, -0.5), (-0.5, 0.5), (0.5, 0.5)] {
            map.set(az, el, az - 1.0).unwrap();
        }
        let (az, _, value) = map.peak().unwrap();
        assert_float_eq!(az, 0.5, abs <= 1e-12);
        assert_float_eq!(value, -0.5, abs <= 1e-12);
    }

    #[test]
    fn test_recenter() {
        let mut map = ramp_map();
        map.recenter(10.0, 5.0);
        assert_eq!(map.num_writes(), 0);
        assert!(map.data().iter().all(|&x| x == 0.0));
        assert!(map.contains(12.0, 6.0));
        assert!(!map.contains(0.0, 0.0));
        let (az_range, el_range) = map.ranges();
        assert_float_eq!(az_range, 4.0, abs <= 1e-12);
        assert_float_eq!(el_range, 2.0, abs <= 1e-12);
    }
}
