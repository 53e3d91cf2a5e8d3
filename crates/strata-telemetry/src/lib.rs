//! # strata-telemetry
//!
//! In-band queue telemetry for the Strata datapath.
//!
//! At dequeue, the scheduler stamps each IPv4 packet with the time it spent
//! in the queue and the number of packets dropped since the last report,
//! both compressed into minifloat codewords and packed into the 16-bit
//! identification field. The header checksum is patched incrementally, so
//! a passive analyzer downstream can read the metrics without any extra
//! header bytes.
//!
//! ## Crate structure
//!
//! - [`minifloat`]: Narrow float codec with remainder tracking
//! - [`drops`]: Per-scheduler drop counters split by ECN capability
//! - [`checksum`]: Internet checksum, full and incremental
//! - [`ipv4`]: Identification field layout, stamping, readback
//! - [`packet`]: Packet buffer access and Ethernet framing
//! - [`inject`]: Dequeue-time dispatch and the per-scheduler [`Telemetry`]
//! - [`config`]: TOML configuration
//! - [`stats`]: Stamping outcome counters
//! - [`error`]: Error types

pub mod checksum;
pub mod config;
pub mod drops;
pub mod error;
pub mod inject;
pub mod ipv4;
pub mod minifloat;
pub mod packet;
pub mod stats;

pub use config::TelemetryConfig;
pub use drops::{DropMetrics, Ecn};
pub use inject::{inject_metrics, Injection, Telemetry};
pub use minifloat::{Encoded, FloatFormat};
