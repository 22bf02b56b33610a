//! # Beam tracker
//!
//! The [`BeamTracker`] keeps the receive terminal pointed at the peak of the incoming beam. It
//! combines four mechanisms:
//!
//! - Gradient ascent with momentum and an adaptive step, driven either by signal-map central
//!   differences ([`BeamTracker::update`]) or by direct measurements through a [`SignalProbe`]
//!   ([`BeamTracker::update_with`]).
//!
//! - A two-axis PID loop towards an externally supplied target ([`BeamTracker::pid_update`]).
//!
//! - Raster scans that fill the embedded [`SignalMap`] and jump to the strongest point
//!   ([`BeamTracker::scan`], [`BeamTracker::calibrate`]).
//!
//! - A mode state machine: `Tracking` becomes `Misaligned` when the strength drops below the
//!   threshold, `Misaligned` becomes `Reacquiring` when an expanded scan is started, and a
//!   successful scan returns to `Tracking`.
//!
//! # Examples
//!
//! ```
//! use fsolink::tracker::{BeamTracker, GaussianBeam, TrackerConfig};
//!
//! let mut beam = GaussianBeam::new(0.03, -0.02, 0.05);
//! let mut tracker = BeamTracker::new(0.0, 0.0, TrackerConfig::for_beam_width(0.05))?;
//! for _ in 0 .. 50 {
//!     tracker.update_with(&mut beam);
//! }
//! let (az, el) = tracker.position();
//! assert!((az - 0.03).hypot(el + 0.02) < 0.01);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use itertools::iproduct;
use serde::{Deserialize, Serialize};

use crate::pid::{PidConfig, PidController};
use crate::signal_map::SignalMap;
use crate::{Error, LogLevel};

/// Largest number of points visited by a single scan
pub const MAX_SCAN_POINTS: usize = 1 << 20;

/// Source of signal-strength measurements at given pointing angles
pub trait SignalProbe {
    /// Returns signal strength measured with the terminal pointed at `(az, el)`.
    fn measure(&mut self, az: f64, el: f64) -> f64;
}

impl<F: FnMut(f64, f64) -> f64> SignalProbe for F {
    fn measure(&mut self, az: f64, el: f64) -> f64 {
        self(az, el)
    }
}

/// Circular Gaussian beam profile
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
pub struct GaussianBeam {
    /// Azimuth of the beam center (rad)
    pub center_az: f64,
    /// Elevation of the beam center (rad)
    pub center_el: f64,
    /// Standard deviation of the profile (rad)
    pub width: f64,
    /// Strength at the beam center
    pub peak: f64,
}

impl GaussianBeam {
    /// Returns unit-peak beam with given center and width.
    #[must_use]
    pub fn new(center_az: f64, center_el: f64, width: f64) -> Self {
        Self {
            center_az,
            center_el,
            width,
            peak: 1.0,
        }
    }

    /// Returns strength of the beam at given angles.
    #[must_use]
    pub fn strength(&self, az: f64, el: f64) -> f64 {
        let (d_az, d_el) = (az - self.center_az, el - self.center_el);
        self.peak * (-(d_az * d_az + d_el * d_el) / (2.0 * self.width * self.width)).exp()
    }
}

impl SignalProbe for GaussianBeam {
    fn measure(&mut self, az: f64, el: f64) -> f64 {
        self.strength(az, el)
    }
}

/// Tracker settings
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Initial gradient step
    pub step: f64,
    /// Smallest gradient step
    pub step_min: f64,
    /// Largest gradient step
    pub step_max: f64,
    /// Factor by which the step grows after an improvement and shrinks otherwise
    pub adapt_factor: f64,
    /// Momentum coefficient of the velocity update
    pub momentum: f64,
    /// Half-width of the central-difference gradient stencil (rad)
    pub gradient_delta: f64,
    /// Velocity magnitude below which an update counts towards convergence (rad)
    pub epsilon: f64,
    /// Number of consecutive small updates needed for convergence
    pub convergence_iters: u32,
    /// Strength below which the link counts as misaligned
    pub signal_threshold: f64,
    /// Number of azimuth and elevation samples of the signal map
    pub map_dims: (usize, usize),
    /// Azimuth and elevation spans of the signal map (rad)
    pub map_ranges: (f64, f64),
    /// Span of a normal scan (rad)
    pub scan_range: f64,
    /// Grid spacing of a normal scan (rad)
    pub scan_resolution: f64,
    /// Factor by which the scan span is expanded during reacquisition
    pub reacquire_expansion: f64,
    /// PID loop settings
    pub pid: PidConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self::for_beam_width(0.05)
    }
}

impl TrackerConfig {
    /// Returns settings scaled to a Gaussian beam of given width (rad).
    #[must_use]
    pub fn for_beam_width(width: f64) -> Self {
        let width2 = width * width;
        Self {
            step: 0.8 * width2,
            step_min: 0.04 * width2,
            step_max: 1.6 * width2,
            adapt_factor: 1.2,
            momentum: 0.4,
            gradient_delta: 0.1 * width,
            epsilon: 0.02 * width,
            convergence_iters: 5,
            signal_threshold: 0.1,
            map_dims: (81, 81),
            map_ranges: (8.0 * width, 8.0 * width),
            scan_range: 4.0 * width,
            scan_resolution: 0.25 * width,
            reacquire_expansion: 2.0,
            pid: PidConfig::default(),
        }
    }

    /// Checks validity of the settings.
    ///
    /// # Errors
    ///
    /// Returns an error if a step bound, the momentum, the adaptation factor or a scan parameter
    /// is out of range, or if the PID settings are invalid.
    pub fn validate(&self) -> Result<(), Error> {
        let positive = [
            ("step_min", self.step_min),
            ("gradient_delta", self.gradient_delta),
            ("epsilon", self.epsilon),
            ("scan_range", self.scan_range),
            ("scan_resolution", self.scan_resolution),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParam(format!(
                    "Tracker {name} must be positive (found {value})"
                )));
            }
        }
        if !(self.step_min <= self.step && self.step <= self.step_max && self.step_max.is_finite())
        {
            return Err(Error::InvalidParam(format!(
                "Tracker step {} must lie in [{}, {}]",
                self.step, self.step_min, self.step_max
            )));
        }
        if !(0.0 .. 1.0).contains(&self.momentum) {
            return Err(Error::InvalidParam(format!(
                "Tracker momentum must be in [0, 1) (found {})",
                self.momentum
            )));
        }
        if !(self.adapt_factor.is_finite() && self.adapt_factor >= 1.0) {
            return Err(Error::InvalidParam(format!(
                "Tracker adaptation factor must be at least 1 (found {})",
                self.adapt_factor
            )));
        }
        if !(self.reacquire_expansion.is_finite() && self.reacquire_expansion >= 1.0) {
            return Err(Error::InvalidParam(format!(
                "Tracker reacquisition expansion must be at least 1 (found {})",
                self.reacquire_expansion
            )));
        }
        if self.signal_threshold.is_nan() {
            return Err(Error::InvalidParam(
                "Tracker signal threshold must not be NaN".to_string(),
            ));
        }
        self.pid.validate()
    }
}

/// Enumeration of tracker modes
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerMode {
    /// Strength above threshold; gradient or PID updates keep the beam centered
    #[default]
    Tracking,
    /// Strength fell below threshold
    Misaligned,
    /// Expanded scan in progress or last expanded scan failed
    Reacquiring,
}

impl std::fmt::Display for TrackerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TrackerMode::Tracking => "tracking",
            TrackerMode::Misaligned => "misaligned",
            TrackerMode::Reacquiring => "reacquiring",
        };
        f.write_str(name)
    }
}

/// Snapshot of the tracker state
#[derive(Clone, Copy, PartialEq, Debug, Serialize)]
pub struct TrackerStatus {
    /// Current azimuth (rad)
    pub azimuth: f64,
    /// Current elevation (rad)
    pub elevation: f64,
    /// Most recent signal strength
    pub signal_strength: f64,
    /// Current mode
    pub mode: TrackerMode,
    /// Current gradient step
    pub step: f64,
    /// Current velocity (azimuth, elevation)
    pub velocity: (f64, f64),
    /// Whether the gradient updates have converged
    pub converged: bool,
    /// Number of gradient and PID updates
    pub update_count: u64,
    /// Number of scans
    pub scan_count: u64,
    /// Number of reacquisition attempts
    pub reacquisition_count: u64,
    /// Number of successful reacquisitions
    pub reacquisition_successes: u64,
}

/// Beam tracker with embedded signal map and PID loop
#[derive(Clone, Debug)]
pub struct BeamTracker {
    /// Settings
    config: TrackerConfig,
    /// Current azimuth (rad)
    az: f64,
    /// Current elevation (rad)
    el: f64,
    /// Most recent signal strength
    strength: f64,
    /// Strength seen by the previous gradient update
    last_strength: f64,
    /// Current gradient step
    step: f64,
    /// Azimuth velocity (rad per update)
    velocity_az: f64,
    /// Elevation velocity (rad per update)
    velocity_el: f64,
    /// Number of consecutive updates with velocity below `epsilon`
    convergence_count: u32,
    /// Signal samples collected so far
    map: SignalMap,
    /// PID loop
    pid: PidController,
    /// Current mode
    mode: TrackerMode,
    /// Number of gradient and PID updates
    update_count: u64,
    /// Number of scans
    scan_count: u64,
    /// Number of reacquisition attempts
    reacquisition_count: u64,
    /// Number of successful reacquisitions
    reacquisition_successes: u64,
    /// Verbosity threshold of this instance
    log_level: LogLevel,
}

impl BeamTracker {
    /// Returns tracker pointed at given initial angles, with its signal map centered there.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid or the signal map cannot be created.
    pub fn new(init_az: f64, init_el: f64, config: TrackerConfig) -> Result<Self, Error> {
        config.validate()?;
        let map = SignalMap::new(init_az, init_el, config.map_dims, config.map_ranges)?;
        let pid = PidController::new(config.pid)?;
        Ok(Self {
            config,
            az: init_az,
            el: init_el,
            strength: 0.0,
            last_strength: 0.0,
            step: config.step,
            velocity_az: 0.0,
            velocity_el: 0.0,
            convergence_count: 0,
            map,
            pid,
            mode: TrackerMode::Tracking,
            update_count: 0,
            scan_count: 0,
            reacquisition_count: 0,
            reacquisition_successes: 0,
            log_level: LogLevel::default(),
        })
    }

    /// Sets verbosity threshold of this instance.
    #[must_use]
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Returns settings.
    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Returns current pointing angles (azimuth, elevation).
    #[must_use]
    pub fn position(&self) -> (f64, f64) {
        (self.az, self.el)
    }

    /// Returns most recent signal strength.
    #[must_use]
    pub fn signal_strength(&self) -> f64 {
        self.strength
    }

    /// Returns signal map.
    #[must_use]
    pub fn map(&self) -> &SignalMap {
        &self.map
    }

    /// Returns PID loop.
    #[must_use]
    pub fn pid(&self) -> &PidController {
        &self.pid
    }

    /// Returns current mode.
    #[must_use]
    pub fn mode(&self) -> TrackerMode {
        self.mode
    }

    /// Returns current gradient step.
    #[must_use]
    pub fn step(&self) -> f64 {
        self.step
    }

    /// Returns current velocity (azimuth, elevation).
    #[must_use]
    pub fn velocity(&self) -> (f64, f64) {
        (self.velocity_az, self.velocity_el)
    }

    /// Returns number of gradient and PID updates.
    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    /// Returns number of scans.
    #[must_use]
    pub fn scan_count(&self) -> u64 {
        self.scan_count
    }

    /// Returns number of reacquisition attempts.
    #[must_use]
    pub fn reacquisition_count(&self) -> u64 {
        self.reacquisition_count
    }

    /// Returns `true` if the gradient updates have converged.
    #[must_use]
    pub fn is_converged(&self) -> bool {
        self.convergence_count >= self.config.convergence_iters
    }

    /// Returns `true` if the last strength check found the link misaligned.
    #[must_use]
    pub fn is_misaligned(&self) -> bool {
        self.mode != TrackerMode::Tracking
    }

    /// Returns snapshot of the tracker state.
    #[must_use]
    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            azimuth: self.az,
            elevation: self.el,
            signal_strength: self.strength,
            mode: self.mode,
            step: self.step,
            velocity: self.velocity(),
            converged: self.is_converged(),
            update_count: self.update_count,
            scan_count: self.scan_count,
            reacquisition_count: self.reacquisition_count,
            reacquisition_successes: self.reacquisition_successes,
        }
    }

    /// Points the terminal at given angles and clears the motion state.
    pub fn set_position(&mut self, az: f64, el: f64) {
        self.az = az;
        self.el = el;
        self.reset_motion();
    }

    /// Sets misalignment threshold.
    pub fn set_threshold(&mut self, threshold: f64) {
        self.config.signal_threshold = threshold;
    }

    /// Replaces PID settings, clearing the PID state.
    ///
    /// # Errors
    ///
    /// Returns an error if the settings are invalid, in which case the tracker is left unchanged.
    pub fn configure_pid(&mut self, pid: PidConfig) -> Result<(), Error> {
        self.pid.configure(pid)?;
        self.config.pid = pid;
        Ok(())
    }

    /// Performs one gradient update using central differences of the signal map.
    ///
    /// Stencil points outside the map contribute a strength of `0`.
    ///
    /// # Parameters
    ///
    /// - `strength`: Signal strength measured at the current position.
    pub fn update(&mut self, strength: f64) {
        let delta = self.config.gradient_delta;
        let sample = |az: f64, el: f64| self.map.get(az, el).unwrap_or(0.0);
        let grad_az = (sample(self.az + delta, self.el) - sample(self.az - delta, self.el))
            / (2.0 * delta);
        let grad_el = (sample(self.az, self.el + delta) - sample(self.az, self.el - delta))
            / (2.0 * delta);
        self.apply_gradient(strength, grad_az, grad_el);
    }

    /// Performs one gradient update using direct measurements, and returns the strength at the
    /// position before the update.
    pub fn update_with<P: SignalProbe + ?Sized>(&mut self, probe: &mut P) -> f64 {
        let delta = self.config.gradient_delta;
        let (az, el) = (self.az, self.el);
        let strength = probe.measure(az, el);
        let grad_az = (probe.measure(az + delta, el) - probe.measure(az - delta, el)) / (2.0 * delta);
        let grad_el = (probe.measure(az, el + delta) - probe.measure(az, el - delta)) / (2.0 * delta);
        self.apply_gradient(strength, grad_az, grad_el);
        strength
    }

    /// Performs one PID update towards a target position.
    ///
    /// # Parameters
    ///
    /// - `target_az`, `target_el`: Target angles (rad).
    ///
    /// - `strength`: Signal strength measured at the current position.
    pub fn pid_update(&mut self, target_az: f64, target_el: f64, strength: f64) {
        self.record(strength);
        let (out_az, out_el) = self.pid.update(target_az - self.az, target_el - self.el);
        self.az += out_az;
        self.el += out_el;
        self.strength = strength;
        self.update_count += 1;
    }

    /// Sweeps a square grid of positions, records every measurement and points the terminal at
    /// the strongest one.
    ///
    /// Positions outside the signal map are measured but not recorded in it.
    ///
    /// # Parameters
    ///
    /// - `center_az`, `center_el`: Center of the sweep (rad).
    ///
    /// - `range`: Span of the sweep on each axis (rad).
    ///
    /// - `resolution`: Grid spacing of the sweep (rad).
    ///
    /// - `probe`: Source of measurements.
    ///
    /// # Returns
    ///
    /// - `peak`: Angles and strength of the strongest position (the first one on ties).
    ///
    /// # Errors
    ///
    /// Returns an error if `range` or `resolution` is not positive, or if the sweep would exceed
    /// [`MAX_SCAN_POINTS`] positions.
    pub fn scan<P: SignalProbe + ?Sized>(
        &mut self,
        center_az: f64,
        center_el: f64,
        range: f64,
        resolution: f64,
        probe: &mut P,
    ) -> Result<(f64, f64, f64), Error> {
        let num_steps = scan_steps(range, resolution)?;
        let az_start = center_az - range / 2.0;
        let el_start = center_el - range / 2.0;
        let mut best = (center_az, center_el, f64::NEG_INFINITY);
        for (j, i) in iproduct!(0 .. num_steps, 0 .. num_steps) {
            let az = az_start + i as f64 * resolution;
            let el = el_start + j as f64 * resolution;
            let strength = probe.measure(az, el);
            self.record_at(az, el, strength);
            if strength > best.2 {
                best = (az, el, strength);
            }
        }
        self.scan_count += 1;
        self.az = best.0;
        self.el = best.1;
        self.strength = best.2;
        self.reset_motion();
        if self.log_level.allows(LogLevel::Debug) {
            tracing::debug!(
                azimuth = best.0,
                elevation = best.1,
                strength = best.2,
                points = num_steps * num_steps,
                "Scan complete"
            );
        }
        Ok(best)
    }

    /// Returns angles and strength of the strongest sample in the signal map.
    ///
    /// # Errors
    ///
    /// Returns an error if the map holds no samples yet.
    pub fn find_peak(&self) -> Result<(f64, f64, f64), Error> {
        self.map.peak()
    }

    /// Compares a strength with the misalignment threshold and updates the mode, returning `true`
    /// if the link is misaligned.
    ///
    /// A strength at or above the threshold returns a misaligned tracker to `Tracking`.
    pub fn check_misalignment(&mut self, strength: f64) -> bool {
        let misaligned = strength < self.config.signal_threshold;
        if misaligned && self.mode == TrackerMode::Tracking {
            self.mode = TrackerMode::Misaligned;
            if self.log_level.allows(LogLevel::Info) {
                tracing::info!(
                    strength,
                    threshold = self.config.signal_threshold,
                    "Beam misaligned"
                );
            }
        } else if !misaligned && self.mode != TrackerMode::Tracking {
            self.mode = TrackerMode::Tracking;
        }
        misaligned
    }

    /// Recenters the signal map on the current position, scans an expanded area around it and
    /// jumps to its peak.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Convergence`] if the strongest position found is not above the
    /// misalignment threshold (the tracker is then left `Reacquiring` at that position), or any
    /// error of [`BeamTracker::scan`].
    pub fn reacquire<P: SignalProbe + ?Sized>(&mut self, probe: &mut P) -> Result<(), Error> {
        self.mode = TrackerMode::Reacquiring;
        self.reacquisition_count += 1;
        let range = self.config.scan_range * self.config.reacquire_expansion;
        let (az, el) = (self.az, self.el);
        self.map.recenter(az, el);
        let (_, _, peak) = self.scan(az, el, range, self.config.scan_resolution, probe)?;
        if peak > self.config.signal_threshold {
            self.mode = TrackerMode::Tracking;
            self.reacquisition_successes += 1;
            self.pid.reset();
            if self.log_level.allows(LogLevel::Info) {
                tracing::info!(strength = peak, attempt = self.reacquisition_count, "Beam reacquired");
            }
            Ok(())
        } else {
            if self.log_level.allows(LogLevel::Warn) {
                tracing::warn!(strength = peak, attempt = self.reacquisition_count, "Reacquisition failed");
            }
            Err(Error::Convergence(format!(
                "Reacquisition peak {peak} does not exceed threshold {}",
                self.config.signal_threshold
            )))
        }
    }

    /// Runs a coarse scan around the current position followed by a fine scan around its peak,
    /// and returns the final peak.
    ///
    /// # Errors
    ///
    /// Returns any error of [`BeamTracker::scan`].
    pub fn calibrate<P: SignalProbe + ?Sized>(
        &mut self,
        probe: &mut P,
    ) -> Result<(f64, f64, f64), Error> {
        let (az, el) = (self.az, self.el);
        let coarse = self.config.scan_resolution;
        let (peak_az, peak_el, _) = self.scan(az, el, self.config.scan_range, coarse, probe)?;
        self.scan(peak_az, peak_el, 2.0 * coarse, 0.2 * coarse, probe)
    }

    /// Applies one momentum step along a gradient and adapts the step size.
    fn apply_gradient(&mut self, strength: f64, grad_az: f64, grad_el: f64) {
        self.record(strength);
        self.velocity_az = self.config.momentum * self.velocity_az + self.step * grad_az;
        self.velocity_el = self.config.momentum * self.velocity_el + self.step * grad_el;
        self.az += self.velocity_az;
        self.el += self.velocity_el;
        self.step = if strength - self.last_strength > 0.0 {
            (self.step * self.config.adapt_factor).min(self.config.step_max)
        } else {
            (self.step / self.config.adapt_factor).max(self.config.step_min)
        };
        self.last_strength = strength;
        self.strength = strength;
        if self.velocity_az.hypot(self.velocity_el) < self.config.epsilon {
            self.convergence_count = self.convergence_count.saturating_add(1);
        } else {
            self.convergence_count = 0;
        }
        self.update_count += 1;
    }

    /// Records a strength at the current position, if it lies inside the signal map.
    fn record(&mut self, strength: f64) {
        let (az, el) = (self.az, self.el);
        self.record_at(az, el, strength);
    }

    /// Records a strength at given angles, if they lie inside the signal map.
    fn record_at(&mut self, az: f64, el: f64, strength: f64) {
        if !self.map.set_if_inside(az, el, strength) && self.log_level.allows(LogLevel::Debug) {
            tracing::debug!(azimuth = az, elevation = el, "Position outside signal map");
        }
    }

    /// Clears velocities, convergence count, reference strength and PID state, and restores the
    /// initial step.
    fn reset_motion(&mut self) {
        self.last_strength = 0.0;
        self.velocity_az = 0.0;
        self.velocity_el = 0.0;
        self.convergence_count = 0;
        self.step = self.config.step;
        self.pid.reset();
    }
}

/// Returns number of grid positions per axis of a scan.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn scan_steps(range: f64, resolution: f64) -> Result<usize, Error> {
    if !(range.is_finite() && range > 0.0 && resolution.is_finite() && resolution > 0.0) {
        return Err(Error::InvalidParam(format!(
            "Scan range and resolution must be positive (found {range} and {resolution})"
        )));
    }
    let ratio = (range / resolution + 1e-9).floor();
    if ratio * ratio > MAX_SCAN_POINTS as f64 {
        return Err(Error::ResourceExhausted(format!(
            "Scan of range {range} at resolution {resolution} exceeds {MAX_SCAN_POINTS} points"
        )));
    }
    Ok(ratio as usize + 1)
}
