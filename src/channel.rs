//! Atmospheric free-space optical channel
//!
//! The channel combines free-space path loss, weather attenuation (Kim model for fog, Carbonneau
//! model for rain, an empirical power law for snow), molecular absorption and log-normal
//! turbulence fading. Fades are either independent draws or an AR(1) process in the log-amplitude
//! with correlation time `tau_c`.

use std::collections::VecDeque;
use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::numeric::{db_to_linear, Lcg};
use crate::{Error, LogLevel};

/// Shortest supported link distance (m)
pub const MIN_DISTANCE_M: f64 = 100.0;

/// Longest supported link distance (m)
pub const MAX_DISTANCE_M: f64 = 10_000.0;

/// Shortest supported wavelength (nm)
pub const MIN_WAVELENGTH_NM: f64 = 500.0;

/// Longest supported wavelength (nm)
pub const MAX_WAVELENGTH_NM: f64 = 2000.0;

/// Number of fades kept in the history ring buffer
pub const FADE_HISTORY_LEN: usize = 1024;

/// Smallest fade returned by the fading models
pub const MIN_FADE: f64 = 0.01;

/// Largest fade returned by the fading models
pub const MAX_FADE: f64 = 100.0;

/// Rytov variance below which the weak-turbulence scintillation approximation is used
const WEAK_TURBULENCE_LIMIT: f64 = 0.3;

/// Saturation value of the scintillation index
const MAX_SCINTILLATION_INDEX: f64 = 10.0;

/// Clear-air attenuation (dB/km)
const CLEAR_AIR_DB_PER_KM: f64 = 0.1;

/// Smallest visibility used in the Kim model (km)
const MIN_VISIBILITY_KM: f64 = 0.01;

/// Enumeration of weather conditions
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Weather {
    /// Clear air
    #[default]
    Clear,
    /// Fog (attenuation set by visibility)
    Fog,
    /// Rain (attenuation set by rainfall rate)
    Rain,
    /// Snow (attenuation set by snowfall rate)
    Snow,
    /// Clear air with strong turbulence (applied through fading only)
    HighTurbulence,
}

impl std::fmt::Display for Weather {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Weather::Clear => "clear",
            Weather::Fog => "fog",
            Weather::Rain => "rain",
            Weather::Snow => "snow",
            Weather::HighTurbulence => "high_turbulence",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Weather {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "clear" => Ok(Weather::Clear),
            "fog" => Ok(Weather::Fog),
            "rain" => Ok(Weather::Rain),
            "snow" => Ok(Weather::Snow),
            "high_turbulence" | "turbulence" => Ok(Weather::HighTurbulence),
            _ => Err(Error::Unsupported(format!("Unknown weather \"{s}\""))),
        }
    }
}

/// Atmospheric parameters
#[derive(Clone, Copy, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct WeatherParams {
    /// Meteorological visibility (m)
    pub visibility_m: f64,
    /// Rainfall rate (mm/h)
    pub rainfall_rate_mm_h: f64,
    /// Snowfall rate (mm/h, liquid equivalent)
    pub snowfall_rate_mm_h: f64,
    /// Air temperature (degrees Celsius)
    pub temperature_c: f64,
    /// Relative humidity as a fraction in `[0, 1]`
    pub humidity: f64,
    /// Refractive-index structure parameter `C_n^2` (m^(-2/3))
    pub cn2: f64,
}

impl Default for WeatherParams {
    fn default() -> Self {
        Self {
            visibility_m: 10_000.0,
            rainfall_rate_mm_h: 0.0,
            snowfall_rate_mm_h: 0.0,
            temperature_c: 15.0,
            humidity: 0.5,
            cn2: 1e-15,
        }
    }
}

impl WeatherParams {
    /// Checks validity of the parameters.
    ///
    /// # Errors
    ///
    /// Returns an error if a rate, the visibility or `C_n^2` is negative or not finite, or if the
    /// humidity lies outside `[0, 1]`.
    pub fn validate(&self) -> Result<(), Error> {
        let nonnegative = [
            ("visibility_m", self.visibility_m),
            ("rainfall_rate_mm_h", self.rainfall_rate_mm_h),
            ("snowfall_rate_mm_h", self.snowfall_rate_mm_h),
            ("cn2", self.cn2),
        ];
        for (name, value) in nonnegative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidParam(format!(
                    "{name} must be nonnegative (found {value})"
                )));
            }
        }
        if !(0.0 ..= 1.0).contains(&self.humidity) {
            return Err(Error::InvalidParam(format!(
                "humidity must be in [0, 1] (found {})",
                self.humidity
            )));
        }
        if !self.temperature_c.is_finite() {
            return Err(Error::InvalidParam("temperature_c must be finite".to_string()));
        }
        Ok(())
    }
}

/// Free-space optical channel with weather attenuation and turbulence fading
#[derive(Clone, Debug)]
pub struct ChannelModel {
    /// Link distance (m)
    distance_m: f64,
    /// Optical wavelength (nm)
    wavelength_nm: f64,
    /// Full-angle beam divergence (rad)
    beam_divergence_rad: f64,
    /// Transmit aperture diameter (m)
    tx_aperture_m: f64,
    /// Receive aperture diameter (m)
    rx_aperture_m: f64,
    /// Weather condition
    weather: Weather,
    /// Atmospheric parameters
    params: WeatherParams,
    /// Fade correlation time (s); `0` means independent fades
    correlation_time_s: f64,
    /// Cached Rytov variance
    rytov_variance: f64,
    /// Cached scintillation index
    scintillation_index: f64,
    /// Cached free-space path loss (dB)
    path_loss_db: f64,
    /// Cached weather attenuation (dB/km)
    attenuation_db_per_km: f64,
    /// Cached molecular absorption over the link (dB)
    absorption_db: f64,
    /// Most recent fades, oldest first
    fade_history: VecDeque<f64>,
    /// Most recent fade (`1` before the first draw)
    last_fade: f64,
    /// Fading random number generator
    rng: Lcg,
    /// Verbosity threshold of this instance
    log_level: LogLevel,
}

impl ChannelModel {
    /// Returns channel with independent fades and default atmospheric parameters.
    ///
    /// # Parameters
    ///
    /// - `distance_m`: Link distance (m), in `[100, 10000]`.
    ///
    /// - `wavelength_nm`: Optical wavelength (nm), in `[500, 2000]`.
    ///
    /// - `weather`: Weather condition.
    ///
    /// # Errors
    ///
    /// Returns an error if the distance or wavelength is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use fsolink::channel::{ChannelModel, Weather};
    ///
    /// let mut channel = ChannelModel::new(1000.0, 1550.0, Weather::Clear)?.with_seed(42);
    /// let received = channel.apply_effects(1e-3, 0.0, 0.0)?;
    /// assert!(received > 0.0 && received < 1e-3);
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new(distance_m: f64, wavelength_nm: f64, weather: Weather) -> Result<Self, Error> {
        check_range("distance_m", distance_m, MIN_DISTANCE_M, MAX_DISTANCE_M)?;
        check_range("wavelength_nm", wavelength_nm, MIN_WAVELENGTH_NM, MAX_WAVELENGTH_NM)?;
        let mut channel = Self {
            distance_m,
            wavelength_nm,
            beam_divergence_rad: 1e-3,
            tx_aperture_m: 0.025,
            rx_aperture_m: 0.025,
            weather,
            params: WeatherParams::default(),
            correlation_time_s: 0.0,
            rytov_variance: 0.0,
            scintillation_index: 0.0,
            path_loss_db: 0.0,
            attenuation_db_per_km: 0.0,
            absorption_db: 0.0,
            fade_history: VecDeque::with_capacity(FADE_HISTORY_LEN),
            last_fade: 1.0,
            rng: Lcg::new(0),
            log_level: LogLevel::default(),
        };
        channel.update_calculations();
        Ok(channel)
    }

    /// Returns channel with given turbulence strength and fade correlation time.
    ///
    /// # Errors
    ///
    /// Returns an error if the distance or wavelength is out of range, or if `cn2` or
    /// `correlation_time_s` is negative.
    pub fn with_turbulence(
        distance_m: f64,
        wavelength_nm: f64,
        weather: Weather,
        cn2: f64,
        correlation_time_s: f64,
    ) -> Result<Self, Error> {
        let mut channel = Self::new(distance_m, wavelength_nm, weather)?;
        channel.set_turbulence(cn2, correlation_time_s)?;
        Ok(channel)
    }

    /// Reseeds the fading generator (`0` requests a clock-derived seed).
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = Lcg::new(seed);
        self
    }

    /// Sets verbosity threshold of this instance.
    #[must_use]
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    /// Sets weather condition and atmospheric parameters, then refreshes cached quantities.
    ///
    /// # Errors
    ///
    /// Returns an error if the parameters are invalid (see [`WeatherParams::validate`]).
    pub fn set_weather(&mut self, weather: Weather, params: WeatherParams) -> Result<(), Error> {
        params.validate()?;
        self.weather = weather;
        self.params = params;
        self.update_calculations();
        Ok(())
    }

    /// Sets turbulence strength and fade correlation time, then refreshes cached quantities.
    ///
    /// # Errors
    ///
    /// Returns an error if either value is negative or not finite.
    pub fn set_turbulence(&mut self, cn2: f64, correlation_time_s: f64) -> Result<(), Error> {
        if !(correlation_time_s.is_finite() && correlation_time_s >= 0.0) {
            return Err(Error::InvalidParam(format!(
                "correlation_time_s must be nonnegative (found {correlation_time_s})"
            )));
        }
        let params = WeatherParams { cn2, ..self.params };
        params.validate()?;
        self.params = params;
        self.correlation_time_s = correlation_time_s;
        self.update_calculations();
        Ok(())
    }

    /// Sets beam divergence and aperture diameters.
    ///
    /// # Errors
    ///
    /// Returns an error if any value is not positive and finite.
    pub fn set_beam(
        &mut self,
        beam_divergence_rad: f64,
        tx_aperture_m: f64,
        rx_aperture_m: f64,
    ) -> Result<(), Error> {
        for (name, value) in [
            ("beam_divergence_rad", beam_divergence_rad),
            ("tx_aperture_m", tx_aperture_m),
            ("rx_aperture_m", rx_aperture_m),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParam(format!(
                    "{name} must be positive (found {value})"
                )));
            }
        }
        self.beam_divergence_rad = beam_divergence_rad;
        self.tx_aperture_m = tx_aperture_m;
        self.rx_aperture_m = rx_aperture_m;
        self.update_calculations();
        Ok(())
    }

    /// Recomputes the cached Rytov variance, scintillation index, path loss, weather attenuation
    /// and absorption from the current parameters.
    pub fn update_calculations(&mut self) {
        self.rytov_variance = rytov_variance(self.params.cn2, self.wavelength_nm, self.distance_m);
        self.scintillation_index = scintillation_index(self.rytov_variance);
        self.path_loss_db = path_loss_db(self.distance_m, self.wavelength_nm);
        self.attenuation_db_per_km = attenuation_db_per_km(self.weather, &self.params, self.wavelength_nm);
        self.absorption_db =
            absorption_db_per_km(self.wavelength_nm, self.params.humidity) * self.distance_km();
        if self.log_level.allows(LogLevel::Debug) {
            tracing::debug!(
                weather = %self.weather,
                rytov_variance = self.rytov_variance,
                scintillation_index = self.scintillation_index,
                path_loss_db = self.path_loss_db,
                attenuation_db_per_km = self.attenuation_db_per_km,
                absorption_db = self.absorption_db,
                "Channel parameters updated"
            );
        }
    }

    /// Returns link distance (m).
    #[must_use]
    pub fn distance_m(&self) -> f64 {
        self.distance_m
    }

    /// Returns link distance (km).
    #[must_use]
    pub fn distance_km(&self) -> f64 {
        self.distance_m / 1000.0
    }

    /// Returns wavelength (nm).
    #[must_use]
    pub fn wavelength_nm(&self) -> f64 {
        self.wavelength_nm
    }

    /// Returns beam divergence (rad).
    #[must_use]
    pub fn beam_divergence_rad(&self) -> f64 {
        self.beam_divergence_rad
    }

    /// Returns weather condition.
    #[must_use]
    pub fn weather(&self) -> Weather {
        self.weather
    }

    /// Returns atmospheric parameters.
    #[must_use]
    pub fn weather_params(&self) -> &WeatherParams {
        &self.params
    }

    /// Returns fade correlation time (s).
    #[must_use]
    pub fn correlation_time_s(&self) -> f64 {
        self.correlation_time_s
    }

    /// Returns Rytov variance (log-amplitude variance).
    #[must_use]
    pub fn rytov_variance(&self) -> f64 {
        self.rytov_variance
    }

    /// Returns scintillation index.
    #[must_use]
    pub fn scintillation_index(&self) -> f64 {
        self.scintillation_index
    }

    /// Returns free-space path loss (dB).
    #[must_use]
    pub fn path_loss_db(&self) -> f64 {
        self.path_loss_db
    }

    /// Returns weather attenuation (dB/km).
    #[must_use]
    pub fn attenuation_db_per_km(&self) -> f64 {
        self.attenuation_db_per_km
    }

    /// Returns molecular absorption over the whole link (dB).
    #[must_use]
    pub fn absorption_db(&self) -> f64 {
        self.absorption_db
    }

    /// Returns total deterministic loss: path loss plus weather attenuation plus absorption (dB).
    #[must_use]
    pub fn total_loss_db(&self) -> f64 {
        self.path_loss_db + self.attenuation_db_per_km * self.distance_km() + self.absorption_db
    }

    /// Returns combined gain of the transmit and receive apertures, `(pi D / lambda)^2` each (dB).
    #[must_use]
    pub fn geometric_gain_db(&self) -> f64 {
        let wavelength_m = self.wavelength_nm * 1e-9;
        [self.tx_aperture_m, self.rx_aperture_m]
            .iter()
            .map(|d| 20.0 * (PI * d / wavelength_m).log10())
            .sum()
    }

    /// Returns most recent fade.
    #[must_use]
    pub fn last_fade(&self) -> f64 {
        self.last_fade
    }

    /// Returns up to the last 1024 fades, oldest first.
    #[must_use]
    pub fn fade_history(&self) -> &VecDeque<f64> {
        &self.fade_history
    }

    /// Returns an independent log-normal fade with unit mean, clamped to `[0.01, 100]`.
    pub fn uncorrelated_fade(&mut self) -> f64 {
        let sigma2 = self.rytov_variance;
        let x = self.rng.gaussian(0.0, sigma2.sqrt());
        let fade = (2.0 * x - 2.0 * sigma2).exp().clamp(MIN_FADE, MAX_FADE);
        self.record_fade(fade);
        fade
    }

    /// Returns next fade of the AR(1) log-amplitude process after a time step `dt_s`.
    ///
    /// Falls back to an independent fade if the correlation time is `0`.
    pub fn correlated_fade(&mut self, dt_s: f64) -> f64 {
        if self.correlation_time_s <= 0.0 {
            return self.uncorrelated_fade();
        }
        let sigma2 = self.rytov_variance;
        let rho = (-dt_s / self.correlation_time_s).exp();
        let prev = 0.5 * self.last_fade.ln() + sigma2;
        let w = self.rng.gaussian(0.0, sigma2.sqrt());
        let log_amplitude = rho * prev + (1.0 - rho * rho).sqrt() * w;
        let fade = (2.0 * log_amplitude - 2.0 * sigma2)
            .exp()
            .clamp(MIN_FADE, MAX_FADE);
        self.record_fade(fade);
        fade
    }

    /// Returns received power after propagation over the channel.
    ///
    /// A fade is drawn (correlated if `dt_s > 0`, independent otherwise), the total loss is
    /// applied and, if `noise_power > 0`, Gaussian noise of that variance is added. The result is
    /// floored at `0`.
    ///
    /// # Parameters
    ///
    /// - `power_in`: Transmitted power (W).
    ///
    /// - `noise_power`: Additive noise power (W).
    ///
    /// - `dt_s`: Time since the previous call (s).
    ///
    /// # Errors
    ///
    /// Returns an error if any input is negative or not finite.
    pub fn apply_effects(&mut self, power_in: f64, noise_power: f64, dt_s: f64) -> Result<f64, Error> {
        for (name, value) in [("power_in", power_in), ("noise_power", noise_power), ("dt_s", dt_s)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(Error::InvalidParam(format!(
                    "{name} must be nonnegative (found {value})"
                )));
            }
        }
        let fade = if dt_s > 0.0 {
            self.correlated_fade(dt_s)
        } else {
            self.uncorrelated_fade()
        };
        let mut received = power_in * fade / db_to_linear(self.total_loss_db());
        if noise_power > 0.0 {
            received += self.rng.gaussian(0.0, noise_power.sqrt());
        }
        Ok(received.max(0.0))
    }

    /// Stores a fade as the most recent one.
    fn record_fade(&mut self, fade: f64) {
        if self.fade_history.len() == FADE_HISTORY_LEN {
            self.fade_history.pop_front();
        }
        self.fade_history.push_back(fade);
        self.last_fade = fade;
    }
}

/// Returns Rytov variance `0.5 C_n^2 k^(7/6) L^(11/6)` with `k = 2 pi / lambda`.
#[must_use]
pub fn rytov_variance(cn2: f64, wavelength_nm: f64, distance_m: f64) -> f64 {
    let k = 2.0 * PI / (wavelength_nm * 1e-9);
    0.5 * cn2 * k.powf(7.0 / 6.0) * distance_m.powf(11.0 / 6.0)
}

/// Returns scintillation index for a Rytov variance, using `4 sigma^2` in weak turbulence and
/// saturating at 10.
#[must_use]
pub fn scintillation_index(rytov_variance: f64) -> f64 {
    let index = if rytov_variance < WEAK_TURBULENCE_LIMIT {
        4.0 * rytov_variance
    } else {
        (4.0 * rytov_variance).exp() - 1.0
    };
    index.min(MAX_SCINTILLATION_INDEX)
}

/// Returns free-space path loss `20 log10(4 pi L / lambda)` (dB).
#[must_use]
pub fn path_loss_db(distance_m: f64, wavelength_nm: f64) -> f64 {
    20.0 * (4.0 * PI * distance_m / (wavelength_nm * 1e-9)).log10()
}

/// Returns weather attenuation (dB/km).
#[must_use]
pub fn attenuation_db_per_km(weather: Weather, params: &WeatherParams, wavelength_nm: f64) -> f64 {
    match weather {
        Weather::Clear | Weather::HighTurbulence => CLEAR_AIR_DB_PER_KM,
        Weather::Fog => {
            let visibility_km = (params.visibility_m / 1000.0).max(MIN_VISIBILITY_KM);
            3.91 / visibility_km * (wavelength_nm / 550.0).powf(-1.3)
        }
        Weather::Rain => 1.076 * params.rainfall_rate_mm_h.powf(0.67) + CLEAR_AIR_DB_PER_KM,
        Weather::Snow => 1.023 * params.snowfall_rate_mm_h.powf(0.72) + CLEAR_AIR_DB_PER_KM,
    }
}

/// Returns molecular absorption (dB/km) for a wavelength band and relative humidity.
#[must_use]
pub fn absorption_db_per_km(wavelength_nm: f64, humidity: f64) -> f64 {
    if (1400.0 ..= 1600.0).contains(&wavelength_nm) {
        0.05 + 0.1 * humidity
    } else if (700.0 ..= 1000.0).contains(&wavelength_nm) {
        0.03 + 0.05 * humidity
    } else {
        0.02 + 0.03 * humidity
    }
}

/// Checks that a value lies in a closed range.
fn check_range(name: &str, value: f64, lo: f64, hi: f64) -> Result<(), Error> {
    if !(lo ..= hi).contains(&value) {
        return Err(Error::InvalidParam(format!(
            "{name} must be in [{lo}, {hi}] (found {value})"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests_of_channel_model {
    use float_eq::assert_float_eq;

    use super::*;

    #[test]
    fn test_new() {
        assert!(ChannelModel::new(50.0, 1550.0, Weather::Clear).is_err());
        assert!(ChannelModel::new(20_000.0, 1550.0, Weather::Clear).is_err());
        assert!(ChannelModel::new(1000.0, 400.0, Weather::Clear).is_err());
        assert!(ChannelModel::new(1000.0, f64::NAN, Weather::Clear).is_err());
        let channel = ChannelModel::new(1000.0, 1550.0, Weather::Clear).unwrap();
        assert_float_eq!(channel.last_fade(), 1.0, abs <= 0.0);
        assert!(channel.fade_history().is_empty());
        assert!(ChannelModel::with_turbulence(1000.0, 1550.0, Weather::Clear, -1.0, 0.0).is_err());
        assert!(ChannelModel::with_turbulence(1000.0, 1550.0, Weather::Clear, 1e-14, -1.0).is_err());
    }

    #[test]
    fn test_weather_from_str() {
        assert_eq!("Fog".parse::<Weather>().unwrap(), Weather::Fog);
        assert_eq!(
            "high-turbulence".parse::<Weather>().unwrap(),
            Weather::HighTurbulence
        );
        assert!("hail".parse::<Weather>().is_err());
        assert_eq!(Weather::HighTurbulence.to_string(), "high_turbulence");
    }

    #[test]
    fn test_cached_values() {
        let channel =
            ChannelModel::with_turbulence(1000.0, 1550.0, Weather::Clear, 1e-14, 0.0).unwrap();
        let k = 2.0 * PI / 1550e-9;
        let expected = 0.5 * 1e-14 * k.powf(7.0 / 6.0) * 1000f64.powf(11.0 / 6.0);
        assert_float_eq!(channel.rytov_variance(), expected, rmax <= 1e-12);
        assert_float_eq!(channel.scintillation_index(), 4.0 * expected, rmax <= 1e-12);
        assert_float_eq!(
            channel.path_loss_db(),
            20.0 * (4.0 * PI * 1000.0 / 1550e-9).log10(),
            abs <= 1e-9
        );
        assert_float_eq!(channel.attenuation_db_per_km(), 0.1, abs <= 1e-12);
        assert_float_eq!(channel.absorption_db(), 0.1, abs <= 1e-12);
    }

    #[test]
    fn test_scintillation_index() {
        assert_float_eq!(scintillation_index(0.1), 0.4, abs <= 1e-12);
        assert_float_eq!(scintillation_index(0.4), 1.6f64.exp() - 1.0, abs <= 1e-12);
        assert_float_eq!(scintillation_index(5.0), 10.0, abs <= 1e-12);
    }

    #[test]
    fn test_attenuation() {
        let params = WeatherParams {
            visibility_m: 200.0,
            ..WeatherParams::default()
        };
        assert_float_eq!(
            attenuation_db_per_km(Weather::Fog, &params, 550.0),
            3.91 / 0.2,
            abs <= 1e-12
        );
        let params = WeatherParams {
            visibility_m: 0.0,
            ..WeatherParams::default()
        };
        assert_float_eq!(
            attenuation_db_per_km(Weather::Fog, &params, 550.0),
            391.0,
            abs <= 1e-9
        );
        let params = WeatherParams {
            rainfall_rate_mm_h: 25.0,
            ..WeatherParams::default()
        };
        assert_float_eq!(
            attenuation_db_per_km(Weather::Rain, &params, 1550.0),
            1.076 * 25f64.powf(0.67) + 0.1,
            abs <= 1e-12
        );
        assert_float_eq!(
            attenuation_db_per_km(Weather::HighTurbulence, &params, 1550.0),
            0.1,
            abs <= 1e-12
        );
    }

    #[test]
    fn test_attenuation_monotonicity() {
        let mut prev_rain = 0.0;
        let mut prev_snow = 0.0;
        let mut prev_fog = f64::INFINITY;
        for i in 0 .. 50 {
            let x = f64::from(i);
            let params = WeatherParams {
                rainfall_rate_mm_h: x,
                snowfall_rate_mm_h: 0.5 * x,
                visibility_m: 50.0 + 100.0 * x,
                ..WeatherParams::default()
            };
            let rain = attenuation_db_per_km(Weather::Rain, &params, 1550.0);
            let snow = attenuation_db_per_km(Weather::Snow, &params, 1550.0);
            let fog = attenuation_db_per_km(Weather::Fog, &params, 1550.0);
            assert!(rain >= prev_rain && snow >= prev_snow && fog <= prev_fog);
            (prev_rain, prev_snow, prev_fog) = (rain, snow, fog);
        }
    }

    #[test]
    fn test_absorption() {
        assert_float_eq!(absorption_db_per_km(1550.0, 0.5), 0.1, abs <= 1e-12);
        assert_float_eq!(absorption_db_per_km(850.0, 1.0), 0.08, abs <= 1e-12);
        assert_float_eq!(absorption_db_per_km(1300.0, 0.0), 0.02, abs <= 1e-12);
    }

    #[test]
    fn test_set_weather() {
        let mut channel = ChannelModel::new(500.0, 850.0, Weather::Clear).unwrap();
        let clear = channel.total_loss_db();
        let params = WeatherParams {
            visibility_m: 200.0,
            ..WeatherParams::default()
        };
        channel.set_weather(Weather::Fog, params).unwrap();
        assert!(channel.total_loss_db() > clear + 5.0);
        let bad = WeatherParams {
            humidity: 1.5,
            ..WeatherParams::default()
        };
        assert!(channel.set_weather(Weather::Fog, bad).is_err());
        assert_eq!(channel.weather(), Weather::Fog);
    }

    #[test]
    fn test_geometric_gain() {
        let mut channel = ChannelModel::new(1000.0, 1550.0, Weather::Clear).unwrap();
        channel.set_beam(1e-3, 0.05, 0.1).unwrap();
        let expected = 20.0 * (PI * 0.05 / 1550e-9).log10() + 20.0 * (PI * 0.1 / 1550e-9).log10();
        assert_float_eq!(channel.geometric_gain_db(), expected, abs <= 1e-9);
        assert!(channel.set_beam(0.0, 0.05, 0.1).is_err());
    }

    #[test]
    fn test_apply_effects_determinism() {
        let make = || {
            ChannelModel::with_turbulence(1500.0, 1550.0, Weather::HighTurbulence, 1e-13, 5e-4)
                .unwrap()
                .with_seed(1234)
        };
        let (mut a, mut b) = (make(), make());
        for i in 0 .. 200 {
            let dt = if i % 3 == 0 { 0.0 } else { 1e-4 };
            let pa = a.apply_effects(1.0, 1e-12, dt).unwrap();
            let pb = b.apply_effects(1.0, 1e-12, dt).unwrap();
            assert_eq!(pa.to_bits(), pb.to_bits());
        }
        assert_eq!(a.fade_history(), b.fade_history());
    }

    #[test]
    fn test_apply_effects_invalid_input() {
        let mut channel = ChannelModel::new(1000.0, 1550.0, Weather::Clear).unwrap();
        assert!(channel.apply_effects(-1.0, 0.0, 0.0).is_err());
        assert!(channel.apply_effects(1.0, -1.0, 0.0).is_err());
        assert!(channel.apply_effects(1.0, 0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_apply_effects_without_turbulence() {
        let mut channel = ChannelModel::with_turbulence(1000.0, 1550.0, Weather::Rain, 0.0, 0.0)
            .unwrap()
            .with_seed(9);
        let expected = 1.0 / db_to_linear(channel.total_loss_db());
        let received = channel.apply_effects(1.0, 0.0, 0.0).unwrap();
        assert_float_eq!(received, expected, rmax <= 1e-12);
        assert_float_eq!(channel.last_fade(), 1.0, abs <= 1e-12);
    }

    #[test]
    fn test_fade_statistics() {
        let mut channel =
            ChannelModel::with_turbulence(1000.0, 1550.0, Weather::Clear, 1e-14, 0.0)
                .unwrap()
                .with_seed(77);
        let n = 20_000;
        let mean = (0 .. n).map(|_| channel.uncorrelated_fade()).sum::<f64>() / f64::from(n);
        assert!((mean - 1.0).abs() < 0.02, "mean fade {mean}");
        assert!(channel
            .fade_history()
            .iter()
            .all(|&f| (MIN_FADE ..= MAX_FADE).contains(&f)));
    }

    #[test]
    fn test_fade_history_is_bounded() {
        let mut channel =
            ChannelModel::with_turbulence(1000.0, 1550.0, Weather::Clear, 1e-14, 1e-3)
                .unwrap()
                .with_seed(5);
        for _ in 0 .. 1500 {
            channel.correlated_fade(1e-4);
        }
        assert_eq!(channel.fade_history().len(), FADE_HISTORY_LEN);
        assert_float_eq!(
            *channel.fade_history().back().unwrap(),
            channel.last_fade(),
            abs <= 0.0
        );
    }

    #[test]
    fn test_correlated_fades_are_smoother() {
        let rough_steps = |tau: f64| {
            let mut channel =
                ChannelModel::with_turbulence(1000.0, 1550.0, Weather::Clear, 2e-14, tau)
                    .unwrap()
                    .with_seed(21);
            let fades: Vec<f64> = (0 .. 2000).map(|_| channel.correlated_fade(1e-4)).collect();
            fades.windows(2).map(|w| (w[1] - w[0]).abs()).sum::<f64>()
        };
        assert!(rough_steps(1e-2) < 0.5 * rough_steps(0.0));
    }
}
