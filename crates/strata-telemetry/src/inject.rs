//! # Metrics Injection
//!
//! Dequeue-time entry point. Quantizes the packet's queue delay, picks the
//! stamping path from the network protocol and writes the metrics into
//! the header. Best effort: a packet that cannot be stamped is forwarded
//! as is, and the reason is returned rather than raised.
//!
//! ```text
//!  enqueue/drop ──▶ Telemetry::record_drop ──▶ DropMetrics
//!                                                  │
//!  dequeue ──▶ Telemetry::inject ──▶ inject_metrics┤
//!                                      │           ▼
//!                                      │     take_quantized
//!                                      ▼           │
//!                            Ipv4 ──▶ ipv4::embed ◀┘
//!                            Ipv6 ──▶ (no-op)
//!                            other ─▶ (no-op)
//! ```

use std::time::Duration;

use crate::config::TelemetryConfig;
use crate::drops::{DropMetrics, Ecn};
use crate::error::PacketError;
use crate::ipv4::{self, Ipv4Header, Ipv4Stamp, MetricsLayout};
use crate::packet::{NetworkProtocol, PacketBuffer, IPV6_HEADER_LEN};
use crate::stats::InjectStats;

/// Queue delay unit: 1024 µs.
pub const DELAY_UNIT_SHIFT: u32 = 10;

/// Convert a sojourn time to 1024 µs units, saturating at `u32::MAX`.
pub fn delay_units(sojourn: Duration) -> u32 {
    u32::try_from(sojourn.as_micros() >> DELAY_UNIT_SHIFT).unwrap_or(u32::MAX)
}

// ─── Injection Outcome ───────────────────────────────────────────────────────

/// What happened to one packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injection {
    /// Metrics written into the IPv4 header.
    Embedded(Ipv4Stamp),
    /// No stamping path for this protocol. The packet is untouched.
    Unsupported(NetworkProtocol),
    /// The header could not be made writable. The packet is untouched and
    /// no drop count was consumed.
    Skipped(PacketError),
    /// Telemetry is switched off.
    Disabled,
}

impl Injection {
    pub fn is_embedded(&self) -> bool {
        matches!(self, Injection::Embedded(_))
    }
}

/// Stamp `packet` with its queue delay and the pending drop count using
/// the default 11 + 5 bit layout.
pub fn inject_metrics<P>(packet: &mut P, metrics: &mut DropMetrics, qdelay_units: u32) -> Injection
where
    P: PacketBuffer + ?Sized,
{
    inject_with_layout(packet, metrics, &MetricsLayout::default(), qdelay_units)
}

/// Stamp `packet` using `layout`.
///
/// Drops are quantized with `layout.drops()`, so the remainder left in
/// `metrics` always matches what the codeword could not carry.
pub fn inject_with_layout<P>(
    packet: &mut P,
    metrics: &mut DropMetrics,
    layout: &MetricsLayout,
    qdelay_units: u32,
) -> Injection
where
    P: PacketBuffer + ?Sized,
{
    // The delay remainder is not carried to later packets.
    let qdelay = layout.qdelay().encode(qdelay_units).codeword;

    let protocol = NetworkProtocol::from(packet.protocol());
    let offset = packet.network_offset();

    match protocol {
        NetworkProtocol::Ipv4 => {
            let writable = match header_end(&*packet, offset, ipv4::HEADER_LEN) {
                Ok(end) => packet.make_writable(end),
                Err(e) => Err(e),
            };
            let buf = match writable {
                Ok(buf) => buf,
                Err(e) => {
                    tracing::debug!(error = %e, "ipv4 metrics skipped");
                    return Injection::Skipped(e);
                }
            };
            match Ipv4Header::new_checked(&mut buf[offset..]) {
                Ok(mut header) => {
                    Injection::Embedded(ipv4::embed(&mut header, metrics, layout, qdelay))
                }
                Err(e) => Injection::Skipped(e),
            }
        }
        NetworkProtocol::Ipv6 => {
            // TODO: carry metrics in the IPv6 flow label.
            let truncated = header_end(&*packet, offset, IPV6_HEADER_LEN).and_then(|needed| {
                if packet.len() < needed {
                    Err(PacketError::Truncated {
                        needed,
                        available: packet.len(),
                    })
                } else {
                    Ok(needed)
                }
            });
            match truncated {
                Ok(_) => Injection::Unsupported(protocol),
                Err(e) => {
                    tracing::debug!(error = %e, "ipv6 header truncated");
                    Injection::Skipped(e)
                }
            }
        }
        NetworkProtocol::Other(_) => Injection::Unsupported(protocol),
    }
}

/// End of a `len`-byte header at `offset`, or `Truncated` if it does not
/// fit in a `usize`.
fn header_end<P>(packet: &P, offset: usize, len: usize) -> Result<usize, PacketError>
where
    P: PacketBuffer + ?Sized,
{
    offset.checked_add(len).ok_or(PacketError::Truncated {
        needed: usize::MAX,
        available: packet.len(),
    })
}

// ─── Telemetry ───────────────────────────────────────────────────────────────

/// Telemetry state owned by one scheduler instance.
///
/// Not synchronized: call it from the context that already serializes the
/// scheduler's enqueue and dequeue. Independent lanes each own one.
#[derive(Debug, Clone)]
pub struct Telemetry {
    config: TelemetryConfig,
    metrics: DropMetrics,
    stats: InjectStats,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new(TelemetryConfig::default())
    }
}

impl Telemetry {
    pub fn new(config: TelemetryConfig) -> Self {
        let metrics = DropMetrics::with_format(config.layout.drops());
        Telemetry {
            config,
            metrics,
            stats: InjectStats::new(),
        }
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    pub fn metrics(&self) -> &DropMetrics {
        &self.metrics
    }

    pub fn stats(&self) -> &InjectStats {
        &self.stats
    }

    /// Count a packet dropped by the scheduler.
    pub fn record_drop(&mut self, ecn: Ecn) {
        self.metrics.record_drop(ecn);
        if ecn.is_capable() {
            self.stats.drops_ecn += 1;
        } else {
            self.stats.drops_nonecn += 1;
        }
    }

    /// Stamp a dequeued packet that waited `qdelay_units` × 1024 µs.
    pub fn inject<P>(&mut self, packet: &mut P, qdelay_units: u32) -> Injection
    where
        P: PacketBuffer + ?Sized,
    {
        let outcome = if self.config.enabled {
            inject_with_layout(packet, &mut self.metrics, &self.config.layout, qdelay_units)
        } else {
            Injection::Disabled
        };
        self.stats.record(&outcome);
        outcome
    }

    /// Stamp a dequeued packet that spent `sojourn` in the queue.
    pub fn inject_sojourn<P>(&mut self, packet: &mut P, sojourn: Duration) -> Injection
    where
        P: PacketBuffer + ?Sized,
    {
        self.inject(packet, delay_units(sojourn))
    }
}
