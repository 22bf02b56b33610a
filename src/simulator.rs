//! # Scenario driver
//!
//! [`run`] simulates one scenario packet by packet: random payload, FEC encoding, interleaving,
//! modulation, propagation over the atmospheric channel, noise, demodulation, deinterleaving, FEC
//! decoding and comparison with the payload. When tracking is enabled, a [`BeamTracker`] follows a
//! wandering beam and its pointing loss scales the received power.
//!
//! The link budget per packet is
//!
//! ```text
//! P_rx = P_tx * G_apertures * fade * pointing / 10^(loss_dB / 10)
//! SNR  = P_rx / P_noise
//! ```
//!
//! and the sample-level noise variance is the mean sample power divided by the SNR.
//!
//! # Examples
//!
//! ```
//! use fsolink::presets;
//! use fsolink::simulator;
//!
//! let mut config = presets::clear_1km();
//! config.num_packets = 5;
//! config.packet_size_bytes = 128;
//! config.seed = 11;
//! let results = simulator::run(&config)?;
//! assert_eq!(results.packets.len(), 5);
//! assert_eq!(results.total_errors, 0);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::time::Instant;

use rand::RngCore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::channel::{
    ChannelModel, Weather, WeatherParams, MAX_DISTANCE_M, MAX_WAVELENGTH_NM, MIN_DISTANCE_M,
    MIN_WAVELENGTH_NM,
};
use crate::fec::{Codec, DecodeStats, FecConfig, FecKind};
use crate::interleaver::BlockInterleaver;
use crate::ldpc::{LdpcConfig, DEFAULT_CONVERGENCE_THRESHOLD, DEFAULT_MAX_ITERATIONS};
use crate::modulation::{ModulationKind, Modulator, Samples};
use crate::numeric::{dbm_to_watts, derive_seed, linear_to_db, Lcg};
use crate::reed_solomon::RsConfig;
use crate::results::{PacketRecord, SimResults, TimeSeriesPoint};
use crate::tracker::{BeamTracker, GaussianBeam, TrackerConfig, TrackerMode};
use crate::utils::{bit_error_count, random_bytes};
use crate::{Error, LogLevel};

/// Codeword length of the byte-oriented Reed-Solomon codes used by the driver
pub const RS_CODEWORD_LEN: usize = 255;

/// Largest number of information bits per LDPC codeword used by the driver
pub const MAX_LDPC_INFO_BITS: usize = 1024;

/// Smallest linear SNR reported, keeping dB values finite when no power arrives
const MIN_SNR: f64 = 1e-30;

/// Beam-wander step per packet, in beam divergences per unit scintillation amplitude
const WANDER_PER_SCINTILLATION: f64 = 0.1;

/// Instance identifier of the payload random stream
const PAYLOAD_STREAM: u64 = 1;

/// Instance identifier of the receiver-noise random stream
const NOISE_STREAM: u64 = 2;

/// Instance identifier of the channel fading stream
const CHANNEL_STREAM: u64 = 3;

/// Instance identifier of the beam-wander stream
const TRACKER_STREAM: u64 = 4;

/// Complete description of a simulated scenario
#[derive(Clone, PartialEq, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SimConfig {
    /// Scenario name
    pub name: String,
    /// Link distance (m)
    pub distance_m: f64,
    /// Optical wavelength (nm)
    pub wavelength_nm: f64,
    /// Beam divergence (rad), also the width of the pointing-loss profile
    pub beam_divergence_rad: f64,
    /// Transmit aperture diameter (m)
    pub tx_aperture_m: f64,
    /// Receive aperture diameter (m)
    pub rx_aperture_m: f64,
    /// Weather condition
    pub weather: Weather,
    /// Atmospheric parameters, including `C_n^2`
    pub atmosphere: WeatherParams,
    /// Fade correlation time (s); `0` means independent fades
    pub correlation_time_s: f64,
    /// Transmitted optical power (dBm)
    pub tx_power_dbm: f64,
    /// Receiver noise floor (dBm)
    pub noise_floor_dbm: f64,
    /// FEC code family
    pub fec: FecKind,
    /// FEC code rate `k / n`
    pub code_rate: f64,
    /// Maximum number of LDPC decoder iterations
    pub ldpc_max_iterations: u32,
    /// Modulation scheme
    pub modulation: ModulationKind,
    /// Symbol rate (symbols per second)
    pub symbol_rate: f64,
    /// Whether the coded stream is interleaved
    pub interleaver_enabled: bool,
    /// Interleaver depth in codewords
    pub interleaver_depth: usize,
    /// Number of packets
    pub num_packets: u32,
    /// Payload bytes per packet
    pub packet_size_bytes: usize,
    /// Simulated time spanned by all packets (s)
    pub simulation_time_s: f64,
    /// Whether beam wander and tracking are simulated
    pub tracking_enabled: bool,
    /// Tracker settings (derived from the beam divergence if absent)
    pub tracker: Option<TrackerConfig>,
    /// Global seed (`0` requests a clock-derived seed)
    pub seed: u64,
    /// Verbosity threshold of the run
    pub log_level: LogLevel,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            name: "custom".to_string(),
            distance_m: 1000.0,
            wavelength_nm: 1550.0,
            beam_divergence_rad: 1e-3,
            tx_aperture_m: 0.025,
            rx_aperture_m: 0.025,
            weather: Weather::Clear,
            atmosphere: WeatherParams::default(),
            correlation_time_s: 0.0,
            tx_power_dbm: 10.0,
            noise_floor_dbm: -40.0,
            fec: FecKind::ReedSolomon,
            code_rate: 223.0 / 255.0,
            ldpc_max_iterations: DEFAULT_MAX_ITERATIONS,
            modulation: ModulationKind::Ook,
            symbol_rate: 1e9,
            interleaver_enabled: true,
            interleaver_depth: 4,
            num_packets: 100,
            packet_size_bytes: 1024,
            simulation_time_s: 1.0,
            tracking_enabled: false,
            tracker: None,
            seed: 0,
            log_level: LogLevel::default(),
        }
    }
}

impl SimConfig {
    /// Checks validity of the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first field found out of range.
    pub fn validate(&self) -> Result<(), Error> {
        check_range("distance_m", self.distance_m, MIN_DISTANCE_M, MAX_DISTANCE_M)?;
        check_range(
            "wavelength_nm",
            self.wavelength_nm,
            MIN_WAVELENGTH_NM,
            MAX_WAVELENGTH_NM,
        )?;
        for (name, value) in [
            ("beam_divergence_rad", self.beam_divergence_rad),
            ("tx_aperture_m", self.tx_aperture_m),
            ("rx_aperture_m", self.rx_aperture_m),
            ("symbol_rate", self.symbol_rate),
            ("simulation_time_s", self.simulation_time_s),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParam(format!(
                    "{name} must be positive (found {value})"
                )));
            }
        }
        self.atmosphere.validate()?;
        if !(self.correlation_time_s.is_finite() && self.correlation_time_s >= 0.0) {
            return Err(Error::InvalidParam(format!(
                "correlation_time_s must be nonnegative (found {})",
                self.correlation_time_s
            )));
        }
        for (name, value) in [
            ("tx_power_dbm", self.tx_power_dbm),
            ("noise_floor_dbm", self.noise_floor_dbm),
        ] {
            if !value.is_finite() {
                return Err(Error::InvalidParam(format!(
                    "{name} must be finite (found {value})"
                )));
            }
        }
        if !(self.code_rate > 0.0 && self.code_rate < 1.0) {
            return Err(Error::InvalidParam(format!(
                "code_rate must be in (0, 1) (found {})",
                self.code_rate
            )));
        }
        if self.num_packets == 0 {
            return Err(Error::InvalidParam("num_packets must be positive".to_string()));
        }
        if self.packet_size_bytes == 0 {
            return Err(Error::InvalidParam(
                "packet_size_bytes must be positive".to_string(),
            ));
        }
        self.modulation.validate()?;
        self.fec_config()?;
        if self.tracking_enabled {
            self.tracker_config().validate()?;
        }
        Ok(())
    }

    /// Returns FEC configuration derived from the code family, code rate and packet size.
    ///
    /// Reed-Solomon codes are RS(255, k) over GF(2^8) with `k = round(255 * rate)`. LDPC codes
    /// carry `k = min(8 * packet_size_bytes, 1024)` information bits and `n = round(k / rate)`
    /// code bits.
    ///
    /// # Errors
    ///
    /// Returns an error if the derived code parameters are invalid.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn fec_config(&self) -> Result<FecConfig, Error> {
        let config = match self.fec {
            FecKind::ReedSolomon => {
                let k = (RS_CODEWORD_LEN as f64 * self.code_rate).round() as usize;
                let config = RsConfig::byte_code(RS_CODEWORD_LEN, k.clamp(1, RS_CODEWORD_LEN - 1));
                config.validate()?;
                FecConfig::ReedSolomon(config)
            }
            FecKind::Ldpc => {
                let k = (8 * self.packet_size_bytes).min(MAX_LDPC_INFO_BITS);
                let n = (k as f64 / self.code_rate).round() as usize;
                let config = LdpcConfig {
                    n,
                    k,
                    max_iterations: self.ldpc_max_iterations,
                    convergence_threshold: DEFAULT_CONVERGENCE_THRESHOLD,
                };
                config.validate()?;
                FecConfig::Ldpc(config)
            }
        };
        Ok(config)
    }

    /// Returns tracker settings, derived from the beam divergence unless given explicitly.
    #[must_use]
    pub fn tracker_config(&self) -> TrackerConfig {
        self.tracker
            .unwrap_or_else(|| TrackerConfig::for_beam_width(self.beam_divergence_rad))
    }

    /// Returns simulated time between packets (s).
    #[must_use]
    pub fn packet_interval_s(&self) -> f64 {
        self.simulation_time_s / f64::from(self.num_packets)
    }

    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_json<P: AsRef<std::path::Path>>(path: P) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// Saves the configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn save_json<P: AsRef<std::path::Path>>(&self, path: P) -> Result<(), Error> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(std::io::BufWriter::new(file), self)?;
        Ok(())
    }
}

/// Runs a scenario and returns its results.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or an engine cannot be built. Failures of
/// individual packets are recorded in the results instead.
pub fn run(config: &SimConfig) -> Result<SimResults, Error> {
    let timer = Instant::now();
    config.validate()?;
    let seed = resolve_seed(config.seed);
    if config.log_level.allows(LogLevel::Info) {
        tracing::info!(
            scenario = %config.name,
            seed,
            packets = config.num_packets,
            fec = %config.fec,
            modulation = %config.modulation,
            weather = %config.weather,
            "Starting simulation"
        );
    }
    let mut link = Link::new(config, seed)?;
    let mut results = SimResults::new(&config.name, seed);
    for packet_id in 0 .. config.num_packets {
        link.transmit_packet(u64::from(packet_id), &mut results)?;
    }
    results.reacquisition_events = link
        .tracking
        .as_ref()
        .map_or(0, |t| t.tracker.reacquisition_count());
    results.finalize(timer.elapsed().as_secs_f64());
    if config.log_level.allows(LogLevel::Info) {
        tracing::info!(
            scenario = %config.name,
            ber = results.ber(),
            avg_snr_db = results.avg_snr_db,
            packet_loss_rate = results.packet_loss_rate,
            duration_s = results.duration_s,
            "Simulation complete"
        );
    }
    Ok(results)
}

/// Runs independent scenarios in parallel and returns their results in input order.
#[must_use]
pub fn run_batch(configs: &[SimConfig]) -> Vec<Result<SimResults, Error>> {
    configs.par_iter().map(run).collect()
}

/// Returns nonzero global seed, synthesizing one from the clock if `seed` is `0`.
fn resolve_seed(seed: u64) -> u64 {
    if seed != 0 {
        return seed;
    }
    match Lcg::new(0).next_u64() {
        0 => 1,
        s => s,
    }
}

/// Beam wander and tracking state
#[derive(Debug)]
struct Tracking {
    /// Pointing tracker
    tracker: BeamTracker,
    /// True beam profile (its center wanders)
    beam: GaussianBeam,
    /// Random stream driving the wander
    rng: Lcg,
    /// Standard deviation of the wander step per packet (rad)
    wander_step: f64,
}

impl Tracking {
    /// Moves the beam, runs one tracker step under the current fade and returns the pointing
    /// gain at the resulting tracker position.
    fn step(&mut self, fade: f64, log_level: LogLevel) -> Result<f64, Error> {
        self.beam.center_az += self.rng.gaussian(0.0, self.wander_step);
        self.beam.center_el += self.rng.gaussian(0.0, self.wander_step);
        let beam = self.beam;
        let mut probe = |az: f64, el: f64| fade * beam.strength(az, el);
        match self.tracker.mode() {
            TrackerMode::Tracking => {
                self.tracker.update_with(&mut probe);
            }
            TrackerMode::Misaligned | TrackerMode::Reacquiring => {
                match self.tracker.reacquire(&mut probe) {
                    Ok(()) | Err(Error::Convergence(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        let (az, el) = self.tracker.position();
        let gain = beam.strength(az, el);
        let misaligned = self.tracker.check_misalignment(fade * gain);
        if misaligned && log_level.allows(LogLevel::Debug) {
            tracing::debug!(fade, pointing_gain = gain, "Link below tracking threshold");
        }
        Ok(gain)
    }
}

/// Engines and random streams of one simulated link
#[derive(Debug)]
struct Link<'a> {
    /// Scenario
    config: &'a SimConfig,
    /// FEC codec
    codec: Codec,
    /// Interleaver (absent if disabled or if it could not be built)
    interleaver: Option<BlockInterleaver>,
    /// Modulator and demodulator
    modulator: Modulator,
    /// Atmospheric channel
    channel: ChannelModel,
    /// Beam wander and tracking, if enabled
    tracking: Option<Tracking>,
    /// Transmitted optical power including aperture gains (W)
    power_in: f64,
    /// Receiver noise power (W)
    noise_power: f64,
    /// Payload random stream
    payload_rng: Lcg,
    /// Receiver-noise random stream
    noise_rng: Lcg,
}

impl<'a> Link<'a> {
    /// Builds all engines of a validated scenario.
    fn new(config: &'a SimConfig, seed: u64) -> Result<Self, Error> {
        let codec = Codec::new(config.fec_config()?)?.with_log_level(config.log_level);
        let interleaver = if config.interleaver_enabled {
            let block_size = match codec.kind() {
                FecKind::ReedSolomon => codec.code_len(),
                FecKind::Ldpc => codec.code_len().div_ceil(8),
            };
            match BlockInterleaver::new(block_size, config.interleaver_depth) {
                Ok(interleaver) => Some(interleaver),
                Err(e) => {
                    if config.log_level.allows(LogLevel::Warn) {
                        tracing::warn!(error = %e, "Interleaver disabled");
                    }
                    None
                }
            }
        } else {
            None
        };
        let modulator = Modulator::new(config.modulation, config.symbol_rate)?;
        let mut channel = ChannelModel::with_turbulence(
            config.distance_m,
            config.wavelength_nm,
            config.weather,
            config.atmosphere.cn2,
            config.correlation_time_s,
        )?
        .with_seed(derive_seed(seed, CHANNEL_STREAM))
        .with_log_level(config.log_level);
        channel.set_weather(config.weather, config.atmosphere)?;
        channel.set_beam(
            config.beam_divergence_rad,
            config.tx_aperture_m,
            config.rx_aperture_m,
        )?;
        let power_in = dbm_to_watts(config.tx_power_dbm + channel.geometric_gain_db());
        let tracking = if config.tracking_enabled {
            let mut tracker = BeamTracker::new(0.0, 0.0, config.tracker_config())?
                .with_log_level(config.log_level);
            let mut beam = GaussianBeam::new(0.0, 0.0, config.beam_divergence_rad);
            tracker.calibrate(&mut beam)?;
            Some(Tracking {
                tracker,
                beam,
                rng: Lcg::new(derive_seed(seed, TRACKER_STREAM)),
                wander_step: WANDER_PER_SCINTILLATION
                    * config.beam_divergence_rad
                    * channel.scintillation_index().sqrt(),
            })
        } else {
            None
        };
        if config.log_level.allows(LogLevel::Debug) {
            tracing::debug!(
                power_in_dbm = config.tx_power_dbm + channel.geometric_gain_db(),
                total_loss_db = channel.total_loss_db(),
                scintillation_index = channel.scintillation_index(),
                "Link budget"
            );
        }
        Ok(Self {
            config,
            codec,
            interleaver,
            modulator,
            channel,
            tracking,
            power_in,
            noise_power: dbm_to_watts(config.noise_floor_dbm),
            payload_rng: Lcg::new(derive_seed(seed, PAYLOAD_STREAM)),
            noise_rng: Lcg::new(derive_seed(seed, NOISE_STREAM)),
        })
    }

    /// Simulates one packet and appends its record and time-series point.
    #[allow(clippy::cast_precision_loss)]
    fn transmit_packet(&mut self, packet_id: u64, results: &mut SimResults) -> Result<(), Error> {
        let interval = self.config.packet_interval_s();
        let payload = random_bytes(self.config.packet_size_bytes, &mut self.payload_rng);
        let coded = self.codec.encode_stream(&payload)?;
        let mut tx_bytes = Vec::with_capacity(coded.len());
        match &self.interleaver {
            Some(interleaver) => interleaver.interleave(&coded, &mut tx_bytes),
            None => tx_bytes.extend_from_slice(&coded),
        }
        let mut samples = self.modulator.modulate(&tx_bytes);

        let mut received_power = self.channel.apply_effects(self.power_in, 0.0, interval)?;
        if let Some(tracking) = &mut self.tracking {
            received_power *= tracking.step(self.channel.last_fade(), self.config.log_level)?;
        }
        let snr = (received_power / self.noise_power).max(MIN_SNR);
        let snr_db = linear_to_db(snr);
        let frame_power = samples.power().unwrap_or(0.0);
        samples.add_noise(frame_power / snr, &mut self.noise_rng);

        let bits_transmitted = 8 * payload.len() as u64;
        let mut record = PacketRecord {
            packet_id,
            bits_transmitted,
            snr_db,
            received_power,
            ..PacketRecord::default()
        };
        match self.receive(&samples, snr_db, payload.len()) {
            Ok((decoded, stats)) => {
                record.bits_received = 8 * decoded.len() as u64;
                record.bit_errors = bit_error_count(&decoded, &payload) as u64;
                record.fec_corrected_errors = stats.corrected as u64;
                record.fec_uncorrectable = u8::from(stats.uncorrectable > 0);
                results.fec_codewords += self.codec.num_blocks(payload.len()) as u64;
                results.fec_iterations += u64::from(stats.iterations);
            }
            Err(e) => {
                if self.config.log_level.allows(LogLevel::Warn) {
                    tracing::warn!(packet_id, error = %e, "Packet skipped");
                }
                record.bit_errors = bits_transmitted;
                record.fec_uncorrectable = 1;
                results.packets_skipped += 1;
            }
        }
        record.ber = record.bit_errors as f64 / bits_transmitted as f64;
        if self.config.log_level.allows(LogLevel::Debug) {
            tracing::debug!(
                packet_id,
                snr_db,
                bit_errors = record.bit_errors,
                fec_corrected = record.fec_corrected_errors,
                "Packet done"
            );
        }

        let tracker_state = self.tracking.as_ref().map(|t| {
            let (az, el) = t.tracker.position();
            (az, el, t.tracker.signal_strength())
        });
        let point = TimeSeriesPoint {
            timestamp: packet_id as f64 * interval,
            ber: record.ber,
            snr_db,
            received_power,
            throughput: (bits_transmitted - record.bit_errors) as f64 / interval,
            beam_azimuth: tracker_state.map(|s| s.0),
            beam_elevation: tracker_state.map(|s| s.1),
            signal_strength: tracker_state.map(|s| s.2),
        };
        results.push(record, point);
        Ok(())
    }

    /// Demodulates, deinterleaves and decodes the samples of one packet.
    fn receive(
        &mut self,
        samples: &Samples,
        snr_db: f64,
        payload_len: usize,
    ) -> Result<(Vec<u8>, DecodeStats), Error> {
        let rx_bytes = self.modulator.demodulate(samples, snr_db)?;
        let coded = match &self.interleaver {
            Some(interleaver) => {
                let mut coded = Vec::with_capacity(rx_bytes.len());
                interleaver.deinterleave(&rx_bytes, &mut coded);
                coded
            }
            None => rx_bytes,
        };
        self.codec.decode_stream(&coded, payload_len)
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
mod tests_of_simulator {
    use float_eq::assert_float_eq;

    use super::*;
    use crate::ldpc::Ldpc;
    use crate::numeric::db_to_linear;
    use crate::presets;

    fn quick(mut config: SimConfig, num_packets: u32, seed: u64) -> SimConfig {
        config.num_packets = num_packets;
        config.seed = seed;
        config.log_level = LogLevel::Off;
        config
    }

    #[test]
    fn test_validate() {
        assert!(SimConfig::default().validate().is_ok());
        let bad = [
            SimConfig {
                distance_m: 50.0,
                ..SimConfig::default()
            },
            SimConfig {
                wavelength_nm: 3000.0,
                ..SimConfig::default()
            },
            SimConfig {
                code_rate: 1.0,
                ..SimConfig::default()
            },
            SimConfig {
                num_packets: 0,
                ..SimConfig::default()
            },
            SimConfig {
                packet_size_bytes: 0,
                ..SimConfig::default()
            },
            SimConfig {
                modulation: ModulationKind::Ppm { order: 6 },
                ..SimConfig::default()
            },
            SimConfig {
                simulation_time_s: 0.0,
                ..SimConfig::default()
            },
            SimConfig {
                noise_floor_dbm: f64::NAN,
                ..SimConfig::default()
            },
        ];
        for config in bad {
            assert!(config.validate().is_err());
            assert!(run(&config).is_err());
        }
    }

    #[test]
    fn test_fec_config() {
        let config = SimConfig::default();
        assert_eq!(config.fec_config().unwrap().dimensions(), (255, 223));
        let config = SimConfig {
            fec: FecKind::Ldpc,
            code_rate: 0.5,
            packet_size_bytes: 64,
            ..SimConfig::default()
        };
        assert_eq!(config.fec_config().unwrap().dimensions(), (1024, 512));
        let config = SimConfig {
            packet_size_bytes: 4096,
            ..config
        };
        assert_eq!(config.fec_config().unwrap().dimensions(), (2048, 1024));
    }

    #[test]
    fn test_resolve_seed() {
        assert_eq!(resolve_seed(42), 42);
        assert_ne!(resolve_seed(0), 0);
    }

    #[test]
    fn test_link_budget() {
        // 1 km at 1550 nm with 25 mm apertures: about -10.2 dB net, SNR about 39.8 dB
        let config = quick(presets::clear_1km(), 1, 3);
        let link = Link::new(&config, 3).unwrap();
        let expected_in =
            dbm_to_watts(config.tx_power_dbm) * db_to_linear(link.channel.geometric_gain_db());
        assert_float_eq!(link.power_in, expected_in, rmax <= 1e-12);
        let net_db = link.channel.geometric_gain_db() - link.channel.total_loss_db();
        assert!((net_db + 10.2).abs() < 0.05, "net gain {net_db} dB");
    }

    #[test]
    fn test_determinism() {
        let config = quick(presets::turbulence_1500m(), 10, 99);
        let a = run(&config).unwrap();
        let b = run(&config).unwrap();
        assert_eq!(a.seed, 99);
        assert_eq!(a.packets, b.packets);
        assert_eq!(a.time_series, b.time_series);
    }

    #[test]
    fn test_time_series() {
        let config = SimConfig {
            simulation_time_s: 0.5,
            ..quick(presets::clear_1km(), 10, 5)
        };
        let results = run(&config).unwrap();
        assert_eq!(results.time_series.len(), 10);
        assert_float_eq!(results.time_series[4].timestamp, 0.2, abs <= 1e-12);
        assert!(results.time_series.iter().all(|p| p.beam_azimuth.is_none()));
        // Error-free packets deliver every payload bit
        assert_float_eq!(
            results.time_series[0].throughput,
            8.0 * 1024.0 / 0.05,
            rmax <= 1e-12
        );
    }

    #[test]
    fn test_interleaver_failure_passes_through() {
        let config = SimConfig {
            interleaver_depth: 0,
            ..quick(presets::clear_1km(), 3, 8)
        };
        let results = run(&config).unwrap();
        assert_eq!(results.packets.len(), 3);
        assert_eq!(results.total_errors, 0);
    }

    #[test]
    fn test_run_batch() {
        let configs = vec![
            quick(presets::clear_1km(), 3, 1),
            SimConfig {
                num_packets: 0,
                ..SimConfig::default()
            },
            quick(presets::dpsk_clear(), 3, 2),
        ];
        let all_results = run_batch(&configs);
        assert_eq!(all_results.len(), 3);
        assert_eq!(all_results[0].as_ref().unwrap().scenario, "clear_1km");
        assert!(all_results[1].is_err());
        assert_eq!(all_results[2].as_ref().unwrap().scenario, "dpsk_clear");
    }

    #[test]
    fn test_e1_clear_link_is_error_free() {
        let config = quick(presets::clear_1km(), 100, 2024);
        assert_eq!(config.packet_size_bytes, 1024);
        let results = run(&config).unwrap();
        assert_eq!(results.seed, 2024);
        assert_eq!(results.packets.len(), 100);
        assert!(results.avg_snr_db >= 20.0);
        assert!(results.ber() < 1e-5);
        assert_float_eq!(results.packet_loss_rate, 0.0, abs <= 0.0);
    }

    #[test]
    fn test_e2_fog_attenuation_is_observable() {
        let config = quick(presets::fog_500m(), 100, 500);
        let results = run(&config).unwrap();
        assert!(results.avg_snr_db >= 0.0);
        assert!(results.ber().is_finite());
        assert!(results.ber() > 1e-4);
        // Same seed, same run
        let rerun = run(&config).unwrap();
        assert_eq!(rerun.total_errors, results.total_errors);
        assert_eq!(rerun.packets, results.packets);
    }

    #[test]
    fn test_e3_rain_ppm_lengths() {
        let config = quick(presets::rain_800m(), 20, 13);
        assert_eq!(config.modulation, ModulationKind::Ppm { order: 4 });
        let mut link = Link::new(&config, 13).unwrap();
        let payload = random_bytes(config.packet_size_bytes, &mut link.payload_rng);
        let coded = link.codec.encode_stream(&payload).unwrap();
        let samples = link.modulator.modulate(&coded);
        let demodulated = link.modulator.demodulate(&samples, 30.0).unwrap();
        assert_eq!(demodulated.len(), coded.len());

        let results = run(&config).unwrap();
        assert!(results.packet_loss_rate >= 0.0);
        assert_eq!(results.packets_skipped, 0);
    }

    #[test]
    fn test_e4_turbulence_triggers_reacquisition() {
        let config = quick(presets::turbulence_1500m(), 100, 1500);
        assert!(config.tracking_enabled);
        let results = run(&config).unwrap();
        assert_eq!(results.packets.len(), 100);
        assert!(results.reacquisition_events >= 1);
        assert!(results.time_series.iter().all(|p| p.beam_azimuth.is_some()));
    }

    #[test]
    fn test_e5_ldpc_clean_channel() {
        let config = quick(presets::ldpc_clean(), 10, 21);
        let FecConfig::Ldpc(ldpc_config) = config.fec_config().unwrap() else {
            panic!("ldpc_clean must select an LDPC code");
        };
        assert_eq!((ldpc_config.n, ldpc_config.k), (1024, 512));
        let ldpc = Ldpc::new(ldpc_config).unwrap();
        let mut rng = Lcg::new(21);
        for _ in 0 .. 5 {
            let info: Vec<u8> = (0 .. 512).map(|_| u8::from(rng.uniform() < 0.5)).collect();
            assert!(ldpc.is_codeword(&ldpc.encode(&info).unwrap()).unwrap());
        }
        let results = run(&config).unwrap();
        assert_eq!(results.total_errors, 0);
        // One iteration per codeword: the syndrome of every received word is already zero
        assert_eq!(results.fec_codewords, 10);
        assert_eq!(results.fec_iterations, results.fec_codewords);
    }

    #[test]
    fn test_e6_dpsk_split_stream() {
        let mut rng = Lcg::new(6);
        let bytes = random_bytes(200, &mut rng);
        let mut split = Modulator::new(ModulationKind::Dpsk, 1e9).unwrap();
        let (Samples::Complex(mut samples), Samples::Complex(tail)) =
            (split.modulate(&bytes[.. 77]), split.modulate(&bytes[77 ..]))
        else {
            panic!("DPSK must produce complex samples");
        };
        samples.extend(tail);
        let mut single = Modulator::new(ModulationKind::Dpsk, 1e9).unwrap();
        let whole = single.modulate(&bytes);
        let mut demodulator = Modulator::new(ModulationKind::Dpsk, 1e9).unwrap();
        let from_split = demodulator
            .demodulate(&Samples::Complex(samples), 30.0)
            .unwrap();
        demodulator.reset();
        assert_eq!(from_split, demodulator.demodulate(&whole, 30.0).unwrap());
        assert_eq!(from_split, bytes);
    }

    #[test]
    fn test_e6_dpsk_link() {
        let results = run(&quick(presets::dpsk_clear(), 10, 17)).unwrap();
        assert_eq!(results.total_errors, 0);
    }
}
