//! This crate simulates free-space optical links packet by packet (FEC, interleaving, modulation,
//! atmospheric channel, beam tracking) and reports BER, SNR and packet-loss statistics. A scenario
//! is chosen from the built-in presets or loaded from a JSON file, and results can be saved to
//! JSON and CSV files.
//!
//! Build the executable with `cargo build --release` and then run `./target/release/fsolink -h`
//! for help on the command-line interface.

#![warn(
    clippy::complexity,
    clippy::pedantic,
    clippy::perf,
    clippy::style,
    clippy::suspicious,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_allocation,
    unused_import_braces,
    unused_qualifications
)]

use anyhow::{Context, Result};
use clap::{crate_name, crate_version, value_parser, Arg, ArgAction, ArgMatches, Command};
use fsolink::results::SimResults;
use fsolink::simulator::{self, SimConfig};
use fsolink::{presets, LogLevel};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Main function
fn main() -> Result<()> {
    let timer = Instant::now();
    let matches = command_line_parser().get_matches();
    if matches.get_flag("list") {
        for config in presets::all() {
            println!(
                "{:<18}{:>8} m  {:<16}{:<6}{}",
                config.name,
                config.distance_m,
                config.weather.to_string(),
                config.fec.to_string(),
                config.modulation
            );
        }
        return Ok(());
    }
    if matches.get_flag("all") {
        let log_level = log_level_from_matches(&matches).unwrap_or_default();
        init_logging(log_level);
        let configs = all_preset_configs(&matches, log_level);
        for (config, results) in configs.iter().zip(simulator::run_batch(&configs)) {
            match results {
                Ok(results) => println!("{}\n", results.summary()),
                Err(e) => eprintln!("Scenario {} failed: {e}", config.name),
            }
        }
    } else {
        let config = sim_config_from_matches(&matches)?;
        init_logging(config.log_level);
        let results = simulator::run(&config)
            .with_context(|| format!("Simulation of scenario {} failed", config.name))?;
        println!("{}", results.summary());
        save_results(&results, &matches)?;
    }
    eprintln!("Elapsed time: {:.3?}", timer.elapsed());
    Ok(())
}

/// Installs the global `tracing` subscriber, writing to standard error.
///
/// `RUST_LOG` takes precedence over the given level.
fn init_logging(log_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Returns command line parser.
fn command_line_parser() -> Command {
    Command::new(crate_name!())
        .version(crate_version!())
        .about("Simulates the end-to-end performance of a free-space optical link")
        .arg(scenario())
        .arg(config_filename())
        .arg(num_packets())
        .arg(seed())
        .arg(json_filename())
        .arg(csv_filename())
        .arg(packets_csv_filename())
        .arg(verbose())
        .arg(list())
        .arg(all())
}

/// Returns argument for preset scenario name.
fn scenario() -> Arg {
    Arg::new("scenario")
        .short('s')
        .long("scenario")
        .value_parser(presets::NAMES)
        .default_value("clear_1km")
        .help("Preset scenario")
}

/// Returns argument for name of JSON file holding a scenario.
fn config_filename() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .conflicts_with("scenario")
        .help("JSON file holding a scenario (replaces the preset)")
}

/// Returns argument for number of packets.
fn num_packets() -> Arg {
    Arg::new("packets")
        .short('n')
        .long("packets")
        .value_parser(value_parser!(u32).range(1 ..))
        .help("Number of packets (overrides the scenario)")
}

/// Returns argument for random seed.
fn seed() -> Arg {
    Arg::new("seed")
        .long("seed")
        .value_parser(value_parser!(u64))
        .help("Random seed, 0 for a clock-derived seed (overrides the scenario)")
}

/// Returns argument for name of JSON file to which results must be saved.
fn json_filename() -> Arg {
    Arg::new("json")
        .short('o')
        .long("json")
        .help("Name of JSON file to which results must be saved")
}

/// Returns argument for name of CSV file to which the time series must be saved.
fn csv_filename() -> Arg {
    Arg::new("csv")
        .long("csv")
        .help("Name of CSV file to which the time series must be saved")
}

/// Returns argument for name of CSV file to which packet statistics must be saved.
fn packets_csv_filename() -> Arg {
    Arg::new("packets_csv")
        .long("packets-csv")
        .help("Name of CSV file to which packet statistics must be saved")
}

/// Returns argument for verbosity.
fn verbose() -> Arg {
    Arg::new("verbose")
        .short('v')
        .action(ArgAction::Count)
        .help("Increases verbosity (-v for info, -vv for debug)")
}

/// Returns argument for listing the presets.
fn list() -> Arg {
    Arg::new("list")
        .long("list")
        .action(ArgAction::SetTrue)
        .help("Lists the preset scenarios and exits")
}

/// Returns argument for running every preset.
fn all() -> Arg {
    Arg::new("all")
        .long("all")
        .action(ArgAction::SetTrue)
        .conflicts_with_all(["config", "json", "csv", "packets_csv"])
        .help("Runs every preset scenario in parallel and prints the summaries")
}

/// Returns scenario selected on the command line, with any overrides applied.
///
/// # Errors
///
/// Returns an error if the scenario file cannot be read or parsed.
fn sim_config_from_matches(matches: &ArgMatches) -> Result<SimConfig> {
    let mut config = match matches.get_one::<String>("config") {
        Some(filename) => SimConfig::load_json(filename)
            .with_context(|| format!("Failed to load scenario from {filename}"))?,
        // OK to unwrap: The scenario argument has a default value and only accepts preset names.
        None => presets::by_name(matches.get_one::<String>("scenario").unwrap())?,
    };
    apply_overrides(&mut config, matches);
    if let Some(log_level) = log_level_from_matches(matches) {
        config.log_level = log_level;
    }
    Ok(config)
}

/// Returns every preset with the command-line overrides applied.
fn all_preset_configs(matches: &ArgMatches, log_level: LogLevel) -> Vec<SimConfig> {
    presets::all()
        .into_iter()
        .map(|mut config| {
            apply_overrides(&mut config, matches);
            config.log_level = log_level;
            config
        })
        .collect()
}

/// Applies packet count and seed overrides.
fn apply_overrides(config: &mut SimConfig, matches: &ArgMatches) {
    if let Some(&num_packets) = matches.get_one::<u32>("packets") {
        config.num_packets = num_packets;
    }
    if let Some(&seed) = matches.get_one::<u64>("seed") {
        config.seed = seed;
    }
}

/// Returns log level requested with `-v` flags, if any.
fn log_level_from_matches(matches: &ArgMatches) -> Option<LogLevel> {
    match matches.get_count("verbose") {
        0 => None,
        1 => Some(LogLevel::Info),
        _ => Some(LogLevel::Debug),
    }
}

/// Saves results to the files named on the command line.
///
/// # Errors
///
/// Returns an error if a file cannot be written.
fn save_results(results: &SimResults, matches: &ArgMatches) -> Result<()> {
    if let Some(filename) = matches.get_one::<String>("json") {
        results
            .save_json(filename)
            .with_context(|| format!("Failed to save results to {filename}"))?;
    }
    if let Some(filename) = matches.get_one::<String>("csv") {
        results
            .write_time_series_csv(filename)
            .with_context(|| format!("Failed to save time series to {filename}"))?;
    }
    if let Some(filename) = matches.get_one::<String>("packets_csv") {
        results
            .write_packet_csv(filename)
            .with_context(|| format!("Failed to save packet statistics to {filename}"))?;
    }
    Ok(())
}
