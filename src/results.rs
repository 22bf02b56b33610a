//! Per-packet records, time series and aggregate statistics of a simulation run

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use itertools::{Itertools, MinMaxResult};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Outcome of one packet
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct PacketRecord {
    /// Packet index, starting at 0
    pub packet_id: u64,
    /// Payload bits transmitted
    pub bits_transmitted: u64,
    /// Payload bits delivered by the receiver (0 if the packet was skipped)
    pub bits_received: u64,
    /// Payload bit errors after decoding (missing bits count as errors)
    pub bit_errors: u64,
    /// Bit error rate of the packet
    pub ber: f64,
    /// Signal-to-noise ratio at the receiver (dB)
    pub snr_db: f64,
    /// Received optical power (W)
    pub received_power: f64,
    /// Symbols or bits corrected by the FEC decoder
    pub fec_corrected_errors: u64,
    /// `1` if any codeword of the packet was uncorrectable or the packet was skipped
    pub fec_uncorrectable: u8,
}

/// CSV header of the packet records, in field order of [`PacketRecord`]
const PACKET_COLUMNS: [&str; 9] = [
    "packet_id",
    "bits_transmitted",
    "bits_received",
    "bit_errors",
    "ber",
    "snr_db",
    "received_power",
    "fec_corrected_errors",
    "fec_uncorrectable",
];

/// One point of the link time series
#[derive(Clone, Copy, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct TimeSeriesPoint {
    /// Simulated time at the start of the packet (s)
    pub timestamp: f64,
    /// Bit error rate of the packet
    pub ber: f64,
    /// Signal-to-noise ratio (dB)
    pub snr_db: f64,
    /// Received optical power (W)
    pub received_power: f64,
    /// Correctly delivered payload bits per second of simulated time
    pub throughput: f64,
    /// Beam azimuth (rad), when tracking is enabled
    pub beam_azimuth: Option<f64>,
    /// Beam elevation (rad), when tracking is enabled
    pub beam_elevation: Option<f64>,
    /// Tracker signal strength, when tracking is enabled
    pub signal_strength: Option<f64>,
}

/// Results of a simulation run
#[derive(Clone, PartialEq, Debug, Default, Deserialize, Serialize)]
pub struct SimResults {
    /// Scenario name
    pub scenario: String,
    /// Global seed actually used (never `0`)
    pub seed: u64,
    /// Per-packet records
    pub packets: Vec<PacketRecord>,
    /// Per-packet time series
    pub time_series: Vec<TimeSeriesPoint>,
    /// Mean of the per-packet SNR values (dB)
    pub avg_snr_db: f64,
    /// Smallest per-packet SNR (dB)
    pub min_snr_db: f64,
    /// Largest per-packet SNR (dB)
    pub max_snr_db: f64,
    /// Mean of the per-packet BER values
    pub avg_ber: f64,
    /// Smallest per-packet BER
    pub min_ber: f64,
    /// Largest per-packet BER
    pub max_ber: f64,
    /// Fraction of packets delivered with errors or skipped
    pub packet_loss_rate: f64,
    /// Total payload bits transmitted
    pub total_bits: u64,
    /// Total payload bit errors
    pub total_errors: u64,
    /// Number of packets delivered with errors or skipped
    pub packets_lost: u64,
    /// Number of packets skipped because demodulation failed
    pub packets_skipped: u64,
    /// Total FEC corrections
    pub fec_corrected_total: u64,
    /// Total FEC codewords decoded
    pub fec_codewords: u64,
    /// Total FEC decoder iterations (LDPC only)
    pub fec_iterations: u64,
    /// Number of tracker reacquisition attempts
    pub reacquisition_events: u64,
    /// Wall-clock duration of the run (s)
    pub duration_s: f64,
}

impl SimResults {
    /// Returns empty results for a scenario.
    #[must_use]
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            ..Self::default()
        }
    }

    /// Appends the record and time-series point of one packet.
    pub fn push(&mut self, record: PacketRecord, point: TimeSeriesPoint) {
        self.total_bits += record.bits_transmitted;
        self.total_errors += record.bit_errors;
        self.fec_corrected_total += record.fec_corrected_errors;
        if record.bit_errors > 0 || record.fec_uncorrectable > 0 {
            self.packets_lost += 1;
        }
        self.packets.push(record);
        self.time_series.push(point);
    }

    /// Computes the aggregate statistics from the packet records.
    #[allow(clippy::cast_precision_loss)]
    pub fn finalize(&mut self, duration_s: f64) {
        self.duration_s = duration_s;
        let num_packets = self.packets.len();
        if num_packets == 0 {
            return;
        }
        let count = num_packets as f64;
        self.avg_snr_db = self.packets.iter().map(|p| p.snr_db).sum::<f64>() / count;
        self.avg_ber = self.packets.iter().map(|p| p.ber).sum::<f64>() / count;
        (self.min_snr_db, self.max_snr_db) = min_max(self.packets.iter().map(|p| p.snr_db));
        (self.min_ber, self.max_ber) = min_max(self.packets.iter().map(|p| p.ber));
        self.packet_loss_rate = self.packets_lost as f64 / count;
    }

    /// Returns aggregate bit error rate (total errors over total bits).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ber(&self) -> f64 {
        if self.total_bits == 0 {
            0.0
        } else {
            self.total_errors as f64 / self.total_bits as f64
        }
    }

    /// Returns human-readable summary of the aggregate statistics.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Scenario:          {} (seed {})", self.scenario, self.seed),
            format!("Packets:           {}", self.packets.len()),
            format!(
                "Packets lost:      {} ({:.2}%), {} skipped",
                self.packets_lost,
                100.0 * self.packet_loss_rate,
                self.packets_skipped
            ),
            format!(
                "Bits / errors:     {} / {} (BER {:.3e})",
                self.total_bits,
                self.total_errors,
                self.ber()
            ),
            format!(
                "Packet BER:        avg {:.3e}, min {:.3e}, max {:.3e}",
                self.avg_ber, self.min_ber, self.max_ber
            ),
            format!(
                "SNR (dB):          avg {:.2}, min {:.2}, max {:.2}",
                self.avg_snr_db, self.min_snr_db, self.max_snr_db
            ),
            format!(
                "FEC:               {} corrections in {} codewords ({} iterations)",
                self.fec_corrected_total, self.fec_codewords, self.fec_iterations
            ),
        ];
        if self.reacquisition_events > 0 {
            lines.push(format!("Reacquisitions:    {}", self.reacquisition_events));
        }
        lines.push(format!("Duration:          {:.3} s", self.duration_s));
        lines.join("\n")
    }

    /// Writes the time series as CSV.
    ///
    /// Beam columns are written only if every point carries tracker data.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_time_series<W: Write>(&self, writer: W) -> Result<(), Error> {
        let tracked = !self.time_series.is_empty()
            && self.time_series.iter().all(|p| p.beam_azimuth.is_some());
        let mut wtr = csv::Writer::from_writer(writer);
        let mut header = vec!["timestamp", "ber", "snr_db", "received_power", "throughput"];
        if tracked {
            header.extend(["beam_azimuth", "beam_elevation", "signal_strength"]);
        }
        wtr.write_record(&header)?;
        for point in &self.time_series {
            let mut row = vec![
                format!("{:.6}", point.timestamp),
                format!("{:.6e}", point.ber),
                format!("{:.4}", point.snr_db),
                format!("{:.6e}", point.received_power),
                format!("{:.6e}", point.throughput),
            ];
            if tracked {
                row.extend(
                    [point.beam_azimuth, point.beam_elevation, point.signal_strength]
                        .iter()
                        .map(|x| format!("{:.6e}", x.unwrap_or_default())),
                );
            }
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Writes the packet records as CSV.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_packets<W: Write>(&self, writer: W) -> Result<(), Error> {
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);
        wtr.write_record(PACKET_COLUMNS)?;
        for record in &self.packets {
            wtr.serialize(record)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// Writes the time series to a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_time_series_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        self.write_time_series(BufWriter::new(File::create(path)?))
    }

    /// Writes the packet records to a CSV file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn write_packet_csv<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        self.write_packets(BufWriter::new(File::create(path)?))
    }

    /// Saves the results to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created or written.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

/// Returns smallest and largest values, or zeros for an empty sequence.
fn min_max<I: Iterator<Item = f64>>(values: I) -> (f64, f64) {
    match values.minmax_by(f64::total_cmp) {
        MinMaxResult::NoElements => (0.0, 0.0),
        MinMaxResult::OneElement(x) => (x, x),
        MinMaxResult::MinMax(lo, hi) => (lo, hi),
    }
}

#[cfg(test)]
mod tests_of_sim_results {
    use float_eq::assert_float_eq;

    use super::*;

    fn record(packet_id: u64, bit_errors: u64, snr_db: f64) -> PacketRecord {
        PacketRecord {
            packet_id,
            bits_transmitted: 1000,
            bits_received: 1000,
            bit_errors,
            ber: bit_errors as f64 / 1000.0,
            snr_db,
            received_power: 1e-6,
            fec_corrected_errors: 3,
            fec_uncorrectable: u8::from(bit_errors > 0),
        }
    }

    fn results(tracked: bool) -> SimResults {
        let mut results = SimResults::new("test", 7);
        for (id, (errors, snr)) in [(0, 20.0), (10, 5.0), (0, 12.5), (2, 8.0)]
            .into_iter()
            .enumerate()
        {
            let id = id as u64;
            let point = TimeSeriesPoint {
                timestamp: 0.01 * id as f64,
                ber: errors as f64 / 1000.0,
                snr_db: snr,
                received_power: 1e-6,
                throughput: 1e5,
                beam_azimuth: tracked.then_some(1e-4),
                beam_elevation: tracked.then_some(-2e-4),
                signal_strength: tracked.then_some(0.9),
            };
            results.push(record(id, errors, snr), point);
        }
        results.finalize(1.5);
        results
    }

    #[test]
    fn test_finalize() {
        let results = results(false);
        assert_eq!(results.total_bits, 4000);
        assert_eq!(results.total_errors, 12);
        assert_eq!(results.packets_lost, 2);
        assert_eq!(results.fec_corrected_total, 12);
        assert_float_eq!(results.ber(), 0.003, abs <= 1e-15);
        assert_float_eq!(results.avg_snr_db, 11.375, abs <= 1e-12);
        assert_float_eq!(results.min_snr_db, 5.0, abs <= 0.0);
        assert_float_eq!(results.max_snr_db, 20.0, abs <= 0.0);
        assert_float_eq!(results.avg_ber, 0.003, abs <= 1e-15);
        assert_float_eq!(results.max_ber, 0.01, abs <= 1e-15);
        assert_float_eq!(results.min_ber, 0.0, abs <= 0.0);
        assert_float_eq!(results.packet_loss_rate, 0.5, abs <= 0.0);
        assert_float_eq!(results.duration_s, 1.5, abs <= 0.0);
    }

    #[test]
    fn test_empty() {
        let mut results = SimResults::new("empty", 1);
        results.finalize(0.0);
        assert_float_eq!(results.ber(), 0.0, abs <= 0.0);
        assert_float_eq!(results.packet_loss_rate, 0.0, abs <= 0.0);
        let mut buf = Vec::new();
        results.write_time_series(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "timestamp,ber,snr_db,received_power,throughput\n"
        );
        let mut buf = Vec::new();
        results.write_packets(&mut buf).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "packet_id,bits_transmitted,bits_received,bit_errors,ber,snr_db,received_power,\
             fec_corrected_errors,fec_uncorrectable\n"
        );
    }

    #[test]
    fn test_summary() {
        let summary = results(false).summary();
        assert!(summary.contains("Scenario:          test (seed 7)"));
        assert!(summary.contains("Packets lost:      2 (50.00%)"));
        assert!(!summary.contains("Reacquisitions"));
        assert_eq!(summary.lines().count(), 8);
        assert!(summary.ends_with("Duration:          1.500 s"));

        let mut tracked = results(true);
        tracked.reacquisition_events = 3;
        let summary = tracked.summary();
        assert_eq!(summary.lines().count(), 9);
        assert!(summary.contains("\nReacquisitions:    3\nDuration:"));
    }

    #[test]
    fn test_write_time_series() {
        let mut buf = Vec::new();
        results(false).write_time_series(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], "timestamp,ber,snr_db,received_power,throughput");
        assert!(lines[2].starts_with("0.010000,1.000000e-2,5.0000,"));

        let mut buf = Vec::new();
        results(true).write_time_series(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let header = text.lines().next().unwrap();
        assert!(header.ends_with(",beam_azimuth,beam_elevation,signal_strength"));
        assert!(text.lines().all(|line| line.split(',').count() == 8));
    }

    #[test]
    fn test_write_packets() {
        let mut buf = Vec::new();
        results(false).write_packets(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "packet_id,bits_transmitted,bits_received,bit_errors,ber,snr_db,received_power,\
             fec_corrected_errors,fec_uncorrectable"
        );
        let first = lines.next().unwrap();
        assert!(first.starts_with("0,1000,1000,0,0.0,20.0,"));
        assert!(first.ends_with(",3,0"));
        assert_eq!(lines.count(), 3);
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let results = results(true);
        let path = std::env::temp_dir().join(format!("fsolink-results-{}.json", std::process::id()));
        results.save_json(&path).unwrap();
        let loaded: SimResults =
            serde_json::from_reader(File::open(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.scenario, "test");
        assert_eq!(loaded.seed, 7);
        assert_eq!(loaded.packets.len(), 4);
        assert_eq!(loaded.total_errors, results.total_errors);
        assert!(loaded.time_series[3].beam_azimuth.is_some());
        assert_float_eq!(loaded.avg_snr_db, results.avg_snr_db, rmax <= 1e-15);
    }
}
