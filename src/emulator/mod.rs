//! Emulator data source - generates synthetic configuration event packets
//!
//! Fills packets the way the device readout does: records in index order,
//! each one validated as soon as it is complete, timestamps strictly
//! increasing. Useful for exercising consumers without hardware.
//!
//! Timing:
//! - Inter-event intervals are exponential with the configured mean (µs)
//! - When the 31-bit timestamp would wrap, the current packet is closed and
//!   the next one starts with the overflow counter incremented

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::common::bits::layout::DATA_MAX;
use crate::common::{LogSink, PacketError, TracingSink};
use crate::packet::{DynapseConfigPacket, TS_OVERFLOW_SHIFT};

/// Largest in-epoch timestamp
const TS_MAX: i64 = i32::MAX as i64;

/// Emulator configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Source ID written into every packet header
    pub source_id: i16,
    /// Records per packet
    pub packet_capacity: i32,
    /// Number of packets produced by `run`
    pub num_packets: u32,
    /// Number of chips to simulate (chip IDs 0..num_chips)
    pub num_chips: u8,
    /// Mean interval between events in microseconds
    pub mean_interval_us: f64,
    /// Fraction of records invalidated after the packet is filled
    pub invalidate_ratio: f64,
    /// Overflow counter of the first packet
    pub initial_ts_overflow: i32,
    /// RNG seed; entropy-seeded when absent
    pub seed: Option<u64>,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            source_id: 1,
            packet_capacity: 1024,
            num_packets: 10,
            num_chips: 4,
            mean_interval_us: 100.0,
            invalidate_ratio: 0.0,
            initial_ts_overflow: 0,
            seed: None,
        }
    }
}

/// Emulator errors
#[derive(Error, Debug)]
pub enum EmulatorError {
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Invalid emulator parameter: {0}")]
    InvalidParameter(String),

    #[error("Timestamp overflow counter exhausted at {0}")]
    OverflowExhausted(i32),
}

/// Synthetic packet producer
pub struct Emulator {
    config: EmulatorConfig,
    rng: StdRng,
    interval: Exp<f64>,
    log: Arc<dyn LogSink>,
    ts_overflow: i32,
    /// Current timestamp within the epoch; may exceed `TS_MAX` until the
    /// next packet folds it into the overflow counter
    timestamp: i64,
    packets_generated: u64,
}

impl Emulator {
    /// Create an emulator whose packets log through `tracing`
    pub fn new(config: EmulatorConfig) -> Result<Self, EmulatorError> {
        Self::with_log(config, Arc::new(TracingSink))
    }

    /// Create an emulator whose packets report to `log`
    pub fn with_log(config: EmulatorConfig, log: Arc<dyn LogSink>) -> Result<Self, EmulatorError> {
        if config.num_chips == 0 {
            return Err(EmulatorError::InvalidParameter(
                "num_chips must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.invalidate_ratio) {
            return Err(EmulatorError::InvalidParameter(format!(
                "invalidate_ratio {} outside [0, 1]",
                config.invalidate_ratio
            )));
        }
        let interval = Exp::new(1.0 / config.mean_interval_us).map_err(|e| {
            EmulatorError::InvalidParameter(format!(
                "mean_interval_us {}: {}",
                config.mean_interval_us, e
            ))
        })?;

        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Self {
            ts_overflow: config.initial_ts_overflow,
            config,
            rng,
            interval,
            log,
            timestamp: 0,
            packets_generated: 0,
        })
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    pub fn packets_generated(&self) -> u64 {
        self.packets_generated
    }

    /// Current overflow counter
    pub fn ts_overflow(&self) -> i32 {
        self.ts_overflow
    }

    /// Move whole epochs out of the running timestamp into the overflow counter
    fn fold_epoch(&mut self) -> Result<(), EmulatorError> {
        while self.timestamp > TS_MAX {
            self.ts_overflow = self
                .ts_overflow
                .checked_add(1)
                .ok_or(EmulatorError::OverflowExhausted(self.ts_overflow))?;
            self.timestamp -= 1i64 << TS_OVERFLOW_SHIFT;
        }
        Ok(())
    }

    /// Draw the next interval, at least 1 µs
    fn next_interval(&mut self) -> i64 {
        let sample: f64 = self.interval.sample(&mut self.rng);
        (sample.round() as i64).max(1)
    }

    /// Produce one packet
    pub fn next_packet(&mut self) -> Result<DynapseConfigPacket, EmulatorError> {
        self.fold_epoch()?;
        let mut packet = DynapseConfigPacket::allocate_with_log(
            self.config.packet_capacity,
            self.config.source_id,
            self.ts_overflow,
            self.log.clone(),
        )?;

        while !packet.is_full() {
            self.timestamp += self.next_interval();
            if self.timestamp > TS_MAX {
                if !packet.is_empty() {
                    // Records of one packet share one overflow value
                    break;
                }
                self.fold_epoch()?;
                packet.header_mut().set_event_ts_overflow(self.ts_overflow)?;
            }

            let chip_id = self.rng.gen_range(0..self.config.num_chips);
            let data = self.rng.gen_range(0..=DATA_MAX);
            packet.push_event(chip_id, data, self.timestamp as i32)?;
        }

        if self.config.invalidate_ratio > 0.0 {
            for mut event in packet.iter_all_mut() {
                if self.rng.gen_bool(self.config.invalidate_ratio) {
                    event.invalidate()?;
                }
            }
        }

        self.packets_generated += 1;
        debug!(
            packet = self.packets_generated,
            events = packet.event_number(),
            valid = packet.event_valid(),
            ts_overflow = packet.header().event_ts_overflow(),
            "Generated packet"
        );
        Ok(packet)
    }

    /// Produce `num_packets` packets, handing each to `consume`
    ///
    /// Returns the number of packets produced.
    pub fn run<F>(&mut self, mut consume: F) -> Result<u64, EmulatorError>
    where
        F: FnMut(DynapseConfigPacket) -> Result<(), EmulatorError>,
    {
        let start = self.packets_generated;
        for _ in 0..self.config.num_packets {
            let packet = self.next_packet()?;
            consume(packet)?;
        }
        let produced = self.packets_generated - start;
        info!(
            packets = produced,
            source_id = self.config.source_id,
            ts_overflow = self.ts_overflow,
            "Emulator finished"
        );
        Ok(produced)
    }
}
