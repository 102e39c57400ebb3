//! Command-line interface: parses and validates the parameters of a single
//! simulation run.

use clap::Parser;

use crate::common::{MAX_PROTOCOL, MIN_PROTOCOL};
use crate::error::ConfigError;

/// Run a deterministic event-driven ARQ protocol simulation.
#[derive(Debug, Parser)]
#[command(name = "link-arq-sim", version, about)]
pub struct Cli {
    /// Protocol number to simulate (2 = stop-and-wait, 3 = PAR, 4 = sliding
    /// window of size 1, 5 = go-back-N, 6 = selective repeat).
    pub protocol: u8,

    /// Number of network-layer events (packets handed to the sender) to
    /// simulate before stopping.
    pub events: u64,

    /// Retransmission timeout, in external event units. Ignored by protocol 2.
    #[arg(default_value_t = 0)]
    pub timeout: u64,

    /// Frame loss rate as a percentage, `0..=99`.
    #[arg(default_value_t = 0)]
    pub loss: u8,

    /// Frame checksum-error rate as a percentage, `0..=99`.
    #[arg(default_value_t = 0)]
    pub cksum: u8,

    /// Tracing debug bitmask: 1 = sends, 2 = receives, 4 = timeouts, 8 = periodic.
    #[arg(default_value_t = 0)]
    pub debug: u32,
}

/// Validated, internal-units simulation configuration derived from a [`Cli`].
#[derive(Debug, Clone, Copy)]
pub struct RunConfig {
    /// Protocol number, `2..=6`.
    pub protocol: u8,
    /// Last tick the driver will run until, in internal ticks.
    pub last_tick: u64,
    /// Retransmission timeout, in internal ticks.
    pub timeout_interval: u64,
    /// Packet loss rate, scaled to `0..RANDOM_BUCKETS`.
    pub pkt_loss: u32,
    /// Checksum error rate, scaled to `0..RANDOM_BUCKETS`.
    pub garbled: u32,
    /// Tracing debug bitmask.
    pub debug: u32,
}

impl Cli {
    /// Validates the raw CLI arguments and converts them to internal units.
    pub fn validate(&self) -> Result<RunConfig, ConfigError> {
        if self.protocol < MIN_PROTOCOL || self.protocol > MAX_PROTOCOL {
            return Err(ConfigError::InvalidProtocol(self.protocol));
        }
        if self.events == 0 {
            return Err(ConfigError::NonPositiveEvents);
        }
        if self.protocol > 2 && self.timeout == 0 {
            return Err(ConfigError::NonPositiveTimeout);
        }
        if self.loss > 99 {
            return Err(ConfigError::InvalidLoss(self.loss));
        }
        if self.cksum > 99 {
            return Err(ConfigError::InvalidCksum(self.cksum));
        }

        Ok(RunConfig {
            protocol: self.protocol,
            last_tick: self.events * crate::common::DELTA,
            timeout_interval: self.timeout * crate::common::DELTA,
            pkt_loss: self.loss as u32 * 10,
            garbled: self.cksum as u32 * 10,
            debug: self.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(protocol: u8, events: u64, timeout: u64, loss: u8, cksum: u8) -> Cli {
        Cli {
            protocol,
            events,
            timeout,
            loss,
            cksum,
            debug: 0,
        }
    }

    #[test]
    fn rejects_protocol_outside_range() {
        assert_eq!(
            cli(1, 10, 0, 0, 0).validate().unwrap_err(),
            ConfigError::InvalidProtocol(1)
        );
        assert_eq!(
            cli(7, 10, 0, 0, 0).validate().unwrap_err(),
            ConfigError::InvalidProtocol(7)
        );
    }

    #[test]
    fn rejects_zero_events() {
        assert_eq!(
            cli(2, 0, 0, 0, 0).validate().unwrap_err(),
            ConfigError::NonPositiveEvents
        );
    }

    #[test]
    fn requires_positive_timeout_above_protocol_2() {
        assert_eq!(
            cli(3, 10, 0, 0, 0).validate().unwrap_err(),
            ConfigError::NonPositiveTimeout
        );
        assert!(cli(2, 10, 0, 0, 0).validate().is_ok());
    }

    #[test]
    fn rejects_out_of_range_rates() {
        assert_eq!(
            cli(2, 10, 0, 100, 0).validate().unwrap_err(),
            ConfigError::InvalidLoss(100)
        );
        assert_eq!(
            cli(2, 10, 0, 0, 100).validate().unwrap_err(),
            ConfigError::InvalidCksum(100)
        );
    }

    #[test]
    fn converts_to_internal_units() {
        let cfg = cli(6, 1000, 400, 5, 2).validate().unwrap();
        assert_eq!(cfg.last_tick, 10_000);
        assert_eq!(cfg.timeout_interval, 4_000);
        assert_eq!(cfg.pkt_loss, 50);
        assert_eq!(cfg.garbled, 20);
    }
}
