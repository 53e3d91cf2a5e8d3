//! # Telemetry Statistics
//!
//! Counters for the stamping path, serializable for JSON export next to
//! the scheduler's own statistics.

use serde::Serialize;

use crate::error::PacketError;
use crate::inject::Injection;

/// Outcome counters for one [`Telemetry`](crate::inject::Telemetry) instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InjectStats {
    /// Packets stamped with metrics.
    pub stamped: u64,
    /// Packets of a protocol without a stamping path (IPv6, non-IP).
    pub unsupported: u64,
    /// Packets too short for their network header.
    pub truncated: u64,
    /// Packets whose buffer could not be made writable.
    pub not_writable: u64,
    /// Packets passed through while telemetry was disabled.
    pub disabled: u64,
    /// Drops recorded for ECN-capable traffic.
    pub drops_ecn: u64,
    /// Drops recorded for non-ECN traffic.
    pub drops_nonecn: u64,
}

impl InjectStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one injection outcome.
    pub fn record(&mut self, outcome: &Injection) {
        match outcome {
            Injection::Embedded(_) => self.stamped += 1,
            Injection::Unsupported(_) => self.unsupported += 1,
            Injection::Skipped(PacketError::Truncated { .. }) => self.truncated += 1,
            Injection::Skipped(PacketError::NotWritable) => self.not_writable += 1,
            Injection::Disabled => self.disabled += 1,
        }
    }

    /// Packets seen by the stamping path.
    pub fn packets(&self) -> u64 {
        self.stamped + self.unsupported + self.truncated + self.not_writable + self.disabled
    }

    /// Fraction of packets that carry metrics.
    pub fn coverage(&self) -> f64 {
        let packets = self.packets();
        if packets == 0 {
            0.0
        } else {
            self.stamped as f64 / packets as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipv4::Ipv4Stamp;
    use crate::packet::NetworkProtocol;

    #[test]
    fn record_counts_each_outcome() {
        let mut stats = InjectStats::new();
        let stamp = Ipv4Stamp {
            ident: 0,
            qdelay: 0,
            drops: 0,
        };
        stats.record(&Injection::Embedded(stamp));
        stats.record(&Injection::Embedded(stamp));
        stats.record(&Injection::Unsupported(NetworkProtocol::Ipv6));
        stats.record(&Injection::Skipped(PacketError::NotWritable));
        stats.record(&Injection::Skipped(PacketError::Truncated {
            needed: 34,
            available: 20,
        }));
        stats.record(&Injection::Disabled);

        assert_eq!(stats.stamped, 2);
        assert_eq!(stats.unsupported, 1);
        assert_eq!(stats.not_writable, 1);
        assert_eq!(stats.truncated, 1);
        assert_eq!(stats.disabled, 1);
        assert_eq!(stats.packets(), 6);
        assert!((stats.coverage() - 2.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn coverage_zero_div() {
        assert_eq!(InjectStats::new().coverage(), 0.0);
    }

    #[test]
    fn serializes_to_json() {
        let mut stats = InjectStats::new();
        stats.stamped = 3;
        stats.drops_ecn = 1;
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["stamped"], 3);
        assert_eq!(json["drops_ecn"], 1);
        assert_eq!(json["not_writable"], 0);
    }
}
