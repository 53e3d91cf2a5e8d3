//! Error types for the telemetry crate.
//!
//! Only configuration and packet access can fail. The codec, the drop
//! accumulator and the embedder are total functions.

use thiserror::Error;

/// A mantissa/exponent split that cannot be used as a [`FloatFormat`].
///
/// [`FloatFormat`]: crate::minifloat::FloatFormat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("exponent must have at least one bit")]
    NoExponent,
    #[error("codeword of {width} bits does not fit a 16-bit field")]
    TooWide { width: u32 },
    #[error("largest value of a ({mantissa_bits},{exponent_bits}) format exceeds 32 bits")]
    Unrepresentable {
        mantissa_bits: u32,
        exponent_bits: u32,
    },
}

/// Two formats whose codewords cannot share one 16-bit header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("qdelay ({qdelay} bits) + drops ({drops} bits) exceeds 16 bits")]
pub struct LayoutError {
    pub qdelay: u32,
    pub drops: u32,
}

/// Why a packet could not be stamped.
///
/// Never fatal: the packet is forwarded untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("header truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },
    #[error("packet buffer is shared and cannot be copied")]
    NotWritable,
}

/// Invalid telemetry configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error(transparent)]
    Format(#[from] FormatError),
    #[error(transparent)]
    Layout(#[from] LayoutError),
}
