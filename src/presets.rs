//! Named scenario presets
//!
//! Every preset starts from [`SimConfig::default`] (1550 nm, 25 mm apertures, 1 mrad divergence,
//! 10 dBm transmit power, -40 dBm noise floor, RS(255, 223), OOK, 100 packets of 1024 bytes) and
//! changes what its name says.

use crate::channel::{Weather, WeatherParams};
use crate::fec::FecKind;
use crate::modulation::ModulationKind;
use crate::simulator::SimConfig;
use crate::Error;

/// Names accepted by [`by_name`]
pub const NAMES: [&str; 7] = [
    "clear_1km",
    "fog_500m",
    "rain_800m",
    "snow_1km",
    "turbulence_1500m",
    "ldpc_clean",
    "dpsk_clear",
];

/// Returns preset with given name.
///
/// # Errors
///
/// Returns an error if no preset has that name.
///
/// # Examples
///
/// ```
/// use fsolink::presets;
///
/// let config = presets::by_name("fog_500m")?;
/// assert_eq!(config.distance_m, 500.0);
/// assert!(presets::by_name("hail_2km").is_err());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn by_name(name: &str) -> Result<SimConfig, Error> {
    match name.to_ascii_lowercase().replace('-', "_").as_str() {
        "clear_1km" => Ok(clear_1km()),
        "fog_500m" => Ok(fog_500m()),
        "rain_800m" => Ok(rain_800m()),
        "snow_1km" => Ok(snow_1km()),
        "turbulence_1500m" => Ok(turbulence_1500m()),
        "ldpc_clean" => Ok(ldpc_clean()),
        "dpsk_clear" => Ok(dpsk_clear()),
        _ => Err(Error::Unsupported(format!(
            "Unknown scenario \"{name}\" (expected one of {})",
            NAMES.join(", ")
        ))),
    }
}

/// Returns all presets.
#[must_use]
pub fn all() -> Vec<SimConfig> {
    vec![
        clear_1km(),
        fog_500m(),
        rain_800m(),
        snow_1km(),
        turbulence_1500m(),
        ldpc_clean(),
        dpsk_clear(),
    ]
}

/// Clear air over 1 km with OOK and RS(255, 223), about 40 dB SNR.
#[must_use]
pub fn clear_1km() -> SimConfig {
    SimConfig {
        name: "clear_1km".to_string(),
        ..SimConfig::default()
    }
}

/// Fog with 200 m visibility over 500 m at 850 nm, transmitting -30 dBm (about 5.7 dB SNR).
#[must_use]
pub fn fog_500m() -> SimConfig {
    SimConfig {
        name: "fog_500m".to_string(),
        distance_m: 500.0,
        wavelength_nm: 850.0,
        weather: Weather::Fog,
        atmosphere: WeatherParams {
            visibility_m: 200.0,
            ..WeatherParams::default()
        },
        tx_power_dbm: -30.0,
        ..SimConfig::default()
    }
}

/// Rain of 25 mm/h over 800 m with 4-PPM, transmitting 0 dBm.
#[must_use]
pub fn rain_800m() -> SimConfig {
    SimConfig {
        name: "rain_800m".to_string(),
        distance_m: 800.0,
        weather: Weather::Rain,
        atmosphere: WeatherParams {
            rainfall_rate_mm_h: 25.0,
            ..WeatherParams::default()
        },
        tx_power_dbm: 0.0,
        modulation: ModulationKind::Ppm { order: 4 },
        ..SimConfig::default()
    }
}

/// Snow of 5 mm/h over 1 km.
#[must_use]
pub fn snow_1km() -> SimConfig {
    SimConfig {
        name: "snow_1km".to_string(),
        weather: Weather::Snow,
        atmosphere: WeatherParams {
            snowfall_rate_mm_h: 5.0,
            temperature_c: -2.0,
            humidity: 0.8,
            ..WeatherParams::default()
        },
        ..SimConfig::default()
    }
}

/// Strong turbulence over 1.5 km with beam tracking.
///
/// `C_n^2 = 1e-13` gives a Rytov variance near 1.7, so the median fade is a few percent of the
/// mean and the tracker regularly drops below its threshold.
#[must_use]
pub fn turbulence_1500m() -> SimConfig {
    SimConfig {
        name: "turbulence_1500m".to_string(),
        distance_m: 1500.0,
        weather: Weather::HighTurbulence,
        atmosphere: WeatherParams {
            cn2: 1e-13,
            ..WeatherParams::default()
        },
        correlation_time_s: 0.5e-3,
        tracking_enabled: true,
        ..SimConfig::default()
    }
}

/// Rate-1/2 LDPC(1024, 512) over clear air, one codeword per 64-byte packet.
#[must_use]
pub fn ldpc_clean() -> SimConfig {
    SimConfig {
        name: "ldpc_clean".to_string(),
        fec: FecKind::Ldpc,
        code_rate: 0.5,
        packet_size_bytes: 64,
        interleaver_enabled: false,
        ..SimConfig::default()
    }
}

/// DPSK with RS(255, 223) over clear air.
#[must_use]
pub fn dpsk_clear() -> SimConfig {
    SimConfig {
        name: "dpsk_clear".to_string(),
        modulation: ModulationKind::Dpsk,
        ..SimConfig::default()
    }
}

#[cfg(test)]
mod tests_of_presets {
    use super::*;

    #[test]
    fn test_by_name() {
        for name in NAMES {
            let config = by_name(name).unwrap();
            assert_eq!(config.name, name);
            assert!(config.validate().is_ok());
        }
        assert_eq!(by_name("Turbulence-1500m").unwrap().name, "turbulence_1500m");
        assert!(matches!(by_name("sunny"), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_all() {
        let names: Vec<String> = all().into_iter().map(|c| c.name).collect();
        assert_eq!(names, NAMES);
    }

    #[test]
    fn test_json_round_trip() {
        let config = turbulence_1500m();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: SimConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.weather, Weather::HighTurbulence);
        assert_eq!(parsed.modulation, config.modulation);
        assert!(parsed.tracking_enabled);
        assert_eq!(parsed.num_packets, config.num_packets);
    }

    #[test]
    fn test_partial_json() {
        let config: SimConfig =
            serde_json::from_str(r#"{"name": "short", "distance_m": 2000.0, "num_packets": 7}"#)
                .unwrap();
        assert_eq!(config.name, "short");
        assert_eq!(config.num_packets, 7);
        assert_eq!(config.fec, FecKind::ReedSolomon);
        assert!(config.validate().is_ok());
    }
}
