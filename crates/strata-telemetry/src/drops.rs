//! # Drop Accounting
//!
//! Per-scheduler drop counters, split by ECN capability, reported in-band
//! as a minifloat codeword.
//!
//! Reading a counter for a packet replaces it with the quantization
//! remainder rather than zero: whatever the codeword could not express is
//! reported on a later packet instead of being lost.
//!
//! One [`DropMetrics`] belongs to one scheduler instance and is mutated
//! under whatever serializes that scheduler's enqueue/dequeue. Sharing one
//! across lanes without external locking is the caller's bug.

use crate::minifloat::FloatFormat;

/// Mask of the two ECN bits in the IPv4 TOS / IPv6 traffic class byte.
pub const ECN_MASK: u8 = 0b11;

// ─── ECN Codepoint ───────────────────────────────────────────────────────────

/// ECN field codepoints (RFC 3168).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Ecn {
    NotEct = 0b00,
    Ect1 = 0b01,
    Ect0 = 0b10,
    Ce = 0b11,
}

impl Ecn {
    /// Extract the codepoint from a TOS / traffic class byte.
    pub fn from_tos(tos: u8) -> Self {
        match tos & ECN_MASK {
            0b00 => Ecn::NotEct,
            0b01 => Ecn::Ect1,
            0b10 => Ecn::Ect0,
            _ => Ecn::Ce,
        }
    }

    /// Whether the sender negotiated ECN (anything but Not-ECT).
    pub fn is_capable(self) -> bool {
        self != Ecn::NotEct
    }
}

// ─── Drop Metrics ────────────────────────────────────────────────────────────

/// Drop counters for ECN-capable and non-ECN traffic.
///
/// Counters are 16 bits wide and wrap on overflow; at the packet rates
/// between two reports this is not expected to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropMetrics {
    drops_ecn: u16,
    drops_nonecn: u16,
    format: FloatFormat,
}

impl Default for DropMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl DropMetrics {
    /// Zeroed counters reported with [`FloatFormat::DROPS`].
    pub fn new() -> Self {
        Self::with_format(FloatFormat::DROPS)
    }

    pub fn with_format(format: FloatFormat) -> Self {
        DropMetrics {
            drops_ecn: 0,
            drops_nonecn: 0,
            format,
        }
    }

    pub fn format(&self) -> FloatFormat {
        self.format
    }

    /// Pending ECN-capable drops.
    pub fn ecn(&self) -> u16 {
        self.drops_ecn
    }

    /// Pending non-ECN drops.
    pub fn non_ecn(&self) -> u16 {
        self.drops_nonecn
    }

    /// Count one drop of a packet carrying `ecn`.
    pub fn record_drop(&mut self, ecn: Ecn) {
        if ecn.is_capable() {
            self.drops_ecn = self.drops_ecn.wrapping_add(1);
        } else {
            self.drops_nonecn = self.drops_nonecn.wrapping_add(1);
        }
    }

    /// Count one drop of a packet with the given TOS byte.
    pub fn record_drop_tos(&mut self, tos: u8) {
        self.record_drop(Ecn::from_tos(tos));
    }

    /// Quantize the counter for a packet with TOS byte `tos` and replace it
    /// with the remainder.
    ///
    /// Any ECN bit set in `tos` selects the ECN counter, so CE-marked and
    /// ECT packets share a bucket. Not idempotent: every call consumes the
    /// reported part of the counter.
    pub fn take_quantized(&mut self, tos: u8) -> u32 {
        self.take_quantized_with(self.format, tos)
    }

    /// [`take_quantized`](Self::take_quantized) in `format` instead of the
    /// counters' own format.
    ///
    /// The remainder is computed in `format`, so a codeword written with
    /// the same format loses nothing.
    pub fn take_quantized_with(&mut self, format: FloatFormat, tos: u8) -> u32 {
        let counter = if tos & ECN_MASK != 0 {
            &mut self.drops_ecn
        } else {
            &mut self.drops_nonecn
        };
        let encoded = format.encode(u32::from(*counter));
        // remainder <= input, so it fits back into the counter.
        *counter = encoded.remainder as u16;
        encoded.codeword
    }
}
