//! Two-axis PID controller for beam pointing

use serde::{Deserialize, Serialize};

use crate::Error;

/// Gains and timing of a [`PidController`]
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PidConfig {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Update rate (Hz); the controller time step is its reciprocal
    pub update_rate_hz: f64,
    /// Anti-windup bound on each integral accumulator
    pub integral_limit: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            kp: 0.5,
            ki: 0.1,
            kd: 0.001,
            update_rate_hz: 100.0,
            integral_limit: 1.0,
        }
    }
}

impl PidConfig {
    /// Checks validity of the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a gain is negative or not finite, or if the update rate or integral
    /// limit is not positive.
    pub fn validate(&self) -> Result<(), Error> {
        for (name, gain) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd)] {
            if !(gain.is_finite() && gain >= 0.0) {
                return Err(Error::InvalidParam(format!(
                    "PID gain {name} must be nonnegative (found {gain})"
                )));
            }
        }
        if !(self.update_rate_hz.is_finite() && self.update_rate_hz > 0.0) {
            return Err(Error::InvalidParam(format!(
                "PID update rate must be positive (found {})",
                self.update_rate_hz
            )));
        }
        if self.integral_limit.is_nan() || self.integral_limit <= 0.0 {
            return Err(Error::InvalidParam(format!(
                "PID integral limit must be positive (found {})",
                self.integral_limit
            )));
        }
        Ok(())
    }
}

/// PID controller acting independently on azimuth and elevation errors
#[derive(Clone, PartialEq, Debug)]
pub struct PidController {
    /// Gains and timing
    config: PidConfig,
    /// Time step (s)
    dt: f64,
    /// Integral accumulators (azimuth, elevation)
    integral: [f64; 2],
    /// Errors seen in the previous update (azimuth, elevation)
    prev_error: [f64; 2],
}

impl PidController {
    /// Returns controller with given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid (see [`PidConfig::validate`]).
    ///
    /// # Examples
    ///
    /// ```
    /// use fsolink::pid::{PidConfig, PidController};
    ///
    /// let mut pid = PidController::new(PidConfig::default())?;
    /// let (mut az, target) = (0.0, 0.2);
    /// for _ in 0 .. 60 {
    ///     let (step, _) = pid.update(target - az, 0.0);
    ///     az += step;
    /// }
    /// assert!((az - target).abs() < 0.01);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(config: PidConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            config,
            dt: 1.0 / config.update_rate_hz,
            integral: [0.0; 2],
            prev_error: [0.0; 2],
        })
    }

    /// Returns configuration.
    #[must_use]
    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Returns time step (s).
    #[must_use]
    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// Returns integral accumulators (azimuth, elevation).
    #[must_use]
    pub fn integral(&self) -> (f64, f64) {
        (self.integral[0], self.integral[1])
    }

    /// Replaces gains and timing, clearing the controller state.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, in which case the controller is left
    /// unchanged.
    pub fn configure(&mut self, config: PidConfig) -> Result<(), Error> {
        *self = Self::new(config)?;
        Ok(())
    }

    /// Returns control output (azimuth, elevation) for given pointing errors.
    pub fn update(&mut self, error_az: f64, error_el: f64) -> (f64, f64) {
        let limit = self.config.integral_limit;
        let mut output = [0.0; 2];
        for (axis, error) in [error_az, error_el].into_iter().enumerate() {
            self.integral[axis] = (self.integral[axis] + error * self.dt).clamp(-limit, limit);
            let derivative = (error - self.prev_error[axis]) / self.dt;
            output[axis] = self.config.kp * error
                + self.config.ki * self.integral[axis]
                + self.config.kd * derivative;
            self.prev_error[axis] = error;
        }
        (output[0], output[1])
    }

    /// Clears integral accumulators and previous errors.
    pub fn reset(&mut self) {
        self.integral = [0.0; 2];
        self.prev_error = [0.0; 2];
    }
}

#[cfg(test)]
mod tests_of_pid_controller {
    use float_eq::assert_float_eq;

    use super::*;

    #[test]
    fn test_new() {
        assert!(PidController::new(PidConfig {
            kp: -1.0,
            ..PidConfig::default()
        })
        .is_err());
        assert!(PidController::new(PidConfig {
            update_rate_hz: 0.0,
            ..PidConfig::default()
        })
        .is_err());
        assert!(PidController::new(PidConfig {
            integral_limit: f64::NAN,
            ..PidConfig::default()
        })
        .is_err());
        let pid = PidController::new(PidConfig::default()).unwrap();
        assert_float_eq!(pid.dt(), 0.01, abs <= 1e-15);
    }

    #[test]
    fn test_first_update() {
        let mut pid = PidController::new(PidConfig::default()).unwrap();
        let (az, el) = pid.update(0.1, -0.2);
        // kp e + ki e dt + kd e / dt
        assert_float_eq!(az, 0.05 + 0.0001 + 0.01, abs <= 1e-12);
        assert_float_eq!(el, -0.1 - 0.0002 - 0.02, abs <= 1e-12);
    }

    #[test]
    fn test_zero_steady_state_error() {
        for target in [0.1, -0.3, 0.5, 1.0] {
            let mut pid = PidController::new(PidConfig::default()).unwrap();
            let (mut az, mut el) = (0.0, 0.0);
            for _ in 0 .. 50 {
                let (u_az, u_el) = pid.update(target - az, -target - el);
                az += u_az;
                el += u_el;
            }
            assert!((target - az).hypot(-target - el) < 0.01);
        }
    }

    #[test]
    fn test_anti_windup() {
        let mut pid = PidController::new(PidConfig {
            integral_limit: 0.05,
            ..PidConfig::default()
        })
        .unwrap();
        for _ in 0 .. 1000 {
            pid.update(10.0, -10.0);
        }
        let (i_az, i_el) = pid.integral();
        assert_float_eq!(i_az, 0.05, abs <= 1e-15);
        assert_float_eq!(i_el, -0.05, abs <= 1e-15);
    }

    #[test]
    fn test_reset() {
        let mut pid = PidController::new(PidConfig::default()).unwrap();
        let first = pid.update(0.3, 0.3);
        pid.update(0.1, 0.2);
        pid.reset();
        assert_eq!(pid.integral(), (0.0, 0.0));
        assert_eq!(pid.update(0.3, 0.3), first);
    }

    #[test]
    fn test_configure() {
        let mut pid = PidController::new(PidConfig::default()).unwrap();
        pid.update(1.0, 1.0);
        assert!(pid
            .configure(PidConfig {
                kd: -1.0,
                ..PidConfig::default()
            })
            .is_err());
        assert_float_eq!(pid.config().kd, 0.001, abs <= 0.0);
        pid.configure(PidConfig {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
            update_rate_hz: 50.0,
            integral_limit: 1.0,
        })
        .unwrap();
        assert_float_eq!(pid.dt(), 0.02, abs <= 1e-15);
        assert_eq!(pid.update(0.25, 0.5), (0.25, 0.5));
    }
}
