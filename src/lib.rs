//! This crate simulates free-space optical (FSO) communication links end to end. Each packet of a
//! scenario is encoded with a Reed-Solomon or LDPC code, interleaved, modulated with OOK, M-PPM
//! or DPSK, attenuated and faded by an atmospheric channel (weather attenuation plus log-normal
//! scintillation), corrupted by receiver noise, and then demodulated, deinterleaved and decoded.
//! When tracking is enabled, a beam tracker follows a wandering beam and its pointing loss enters
//! the link budget. Per-packet statistics and a time series are collected in [`results`] and can
//! be written to CSV and JSON files.
//!
//! The engines are usable on their own:
//!
//! - [`galois`], [`reed_solomon`], [`ldpc`] and the [`fec`] codec facade,
//!
//! - [`interleaver`] and [`modulation`],
//!
//! - [`channel`] for the atmospheric channel,
//!
//! - [`tracker`] (with [`signal_map`] and [`pid`]) for beam pointing,
//!
//! - [`simulator`] and [`presets`] for whole scenarios.
//!
//! # Examples
//!
//! ```
//! use fsolink::{presets, simulator};
//!
//! let mut config = presets::by_name("snow_1km")?;
//! config.num_packets = 4;
//! config.packet_size_bytes = 64;
//! config.seed = 2024;
//! let results = simulator::run(&config)?;
//! println!("{}", results.summary());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

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

mod common;

pub mod channel;
pub mod fec;
pub mod galois;
pub mod interleaver;
pub mod ldpc;
pub mod linalg;
pub mod modulation;
pub mod numeric;
pub mod pid;
pub mod presets;
pub mod reed_solomon;
pub mod results;
pub mod signal_map;
pub mod simulator;
pub mod tracker;
pub mod utils;

pub use common::{Error, LogLevel};
