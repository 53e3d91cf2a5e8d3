//! # Minifloat Codec
//!
//! Lossy compression of small unsigned counters into a few bits.
//!
//! A format splits its codeword into `E` exponent bits above `M` mantissa
//! bits:
//!
//! ```text
//!  ┌──────────────┬────────────────┐
//!  │ exponent (E) │  mantissa (M)  │
//!  └──────────────┴────────────────┘
//!
//!  exponent == 0  →  value = mantissa
//!  exponent >= 1  →  value = (mantissa + 2^M) << (exponent - 1)
//! ```
//!
//! Values below `2^(M+1)` are stored verbatim (exponent 0 and 1 coincide
//! with the plain integer). Larger values keep their top `M` bits below the
//! implicit leading one; the dropped low bits are reported as the
//! remainder so callers can carry the error forward. Encoding always
//! rounds down and saturates at the largest representable value.

use crate::error::FormatError;

// ─── Encoded Value ───────────────────────────────────────────────────────────

/// Result of [`FloatFormat::encode`].
///
/// `decode(codeword) + remainder` is always the encoded input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Encoded {
    pub codeword: u32,
    pub remainder: u32,
}

// ─── Float Format ────────────────────────────────────────────────────────────

/// A validated (mantissa bits, exponent bits) split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatFormat {
    mantissa_bits: u32,
    exponent_bits: u32,
}

impl FloatFormat {
    /// Drop counts: 5-bit codeword, saturates at 448.
    pub const DROPS: FloatFormat = FloatFormat {
        mantissa_bits: 2,
        exponent_bits: 3,
    };

    /// Queue delay in 1024 µs units: 11-bit codeword, saturates at 4 177 920.
    pub const QDELAY: FloatFormat = FloatFormat {
        mantissa_bits: 7,
        exponent_bits: 4,
    };

    /// Validate a split.
    ///
    /// The codeword must fit 16 bits and the largest representable value
    /// must fit 32 bits.
    pub fn new(mantissa_bits: u32, exponent_bits: u32) -> Result<Self, FormatError> {
        if exponent_bits == 0 {
            return Err(FormatError::NoExponent);
        }
        let width = mantissa_bits.saturating_add(exponent_bits);
        if width > 16 {
            return Err(FormatError::TooWide { width });
        }
        // Bit length of max_value(): M+1 significant bits shifted by 2^E - 2.
        let value_bits = u64::from(mantissa_bits) + 1 + ((1u64 << exponent_bits) - 2);
        if value_bits > 32 {
            return Err(FormatError::Unrepresentable {
                mantissa_bits,
                exponent_bits,
            });
        }
        Ok(FloatFormat {
            mantissa_bits,
            exponent_bits,
        })
    }

    pub fn mantissa_bits(&self) -> u32 {
        self.mantissa_bits
    }

    pub fn exponent_bits(&self) -> u32 {
        self.exponent_bits
    }

    /// Codeword width in bits.
    pub fn width(&self) -> u32 {
        self.mantissa_bits + self.exponent_bits
    }

    /// All-ones codeword, returned on saturation.
    pub fn max_codeword(&self) -> u32 {
        (1 << self.width()) - 1
    }

    /// Values below this are stored verbatim.
    pub fn direct_limit(&self) -> u32 {
        1 << (self.mantissa_bits + 1)
    }

    /// Largest representable value, `decode(max_codeword())`.
    pub fn max_value(&self) -> u32 {
        let max_e = (1u32 << self.exponent_bits) - 1;
        let max_m = (1u32 << self.mantissa_bits) - 1;
        ((max_m << 1) + 1) << (max_e - 1)
    }

    /// Decode a codeword. Bits above [`width`](Self::width) are ignored.
    #[inline]
    pub fn decode(&self, codeword: u32) -> u32 {
        let m_max = 1u32 << self.mantissa_bits;
        let fl = codeword & ((m_max << self.exponent_bits) - 1);

        if fl < (m_max << 1) {
            fl
        } else {
            let exponent = fl >> self.mantissa_bits;
            ((fl & (m_max - 1)) + m_max) << (exponent - 1)
        }
    }

    /// Encode a value, rounding down.
    #[inline]
    pub fn encode(&self, value: u32) -> Encoded {
        if value < self.direct_limit() {
            return Encoded {
                codeword: value,
                remainder: 0,
            };
        }

        let max_value = self.max_value();
        if value >= max_value {
            return Encoded {
                codeword: self.max_codeword(),
                remainder: value - max_value,
            };
        }

        // Position of the leading one; at least mantissa_bits + 1 here.
        let len = u32::BITS - 1 - value.leading_zeros();
        let exponent = len - self.mantissa_bits;
        let mantissa = (value >> exponent) & ((1 << self.mantissa_bits) - 1);

        Encoded {
            codeword: ((exponent + 1) << self.mantissa_bits) | mantissa,
            remainder: value & ((1 << exponent) - 1),
        }
    }
}
