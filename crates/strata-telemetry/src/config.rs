//! # Telemetry Configuration
//!
//! ```toml
//! enabled = true
//!
//! [qdelay]
//! mantissa_bits = 7
//! exponent_bits = 4
//!
//! [drops]
//! mantissa_bits = 2
//! exponent_bits = 3
//! ```
//!
//! Every key is optional, including either key of a format section;
//! missing keys take the defaults above.

use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::ConfigError;
use crate::ipv4::MetricsLayout;
use crate::minifloat::FloatFormat;

/// Telemetry settings for one scheduler instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Stamp packets on dequeue. Drops are counted either way.
    pub enabled: bool,
    /// Codeword formats and their placement in the identification field.
    pub layout: MetricsLayout,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        TelemetryConfig {
            enabled: true,
            layout: MetricsLayout::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    enabled: Option<bool>,
    qdelay: FormatFile,
    drops: FormatFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FormatFile {
    mantissa_bits: Option<u32>,
    exponent_bits: Option<u32>,
}

impl FormatFile {
    /// Validate, taking missing keys from `default`.
    fn resolve(&self, default: FloatFormat) -> Result<FloatFormat, ConfigError> {
        Ok(FloatFormat::new(
            self.mantissa_bits.unwrap_or(default.mantissa_bits()),
            self.exponent_bits.unwrap_or(default.exponent_bits()),
        )?)
    }
}

impl TelemetryConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(s)?;
        let enabled = file.enabled.unwrap_or(true);
        let qdelay = file.qdelay.resolve(FloatFormat::QDELAY)?;
        let drops = file.drops.resolve(FloatFormat::DROPS)?;
        let layout = MetricsLayout::new(qdelay, drops)?;

        tracing::debug!(
            enabled,
            qdelay_bits = qdelay.width(),
            drops_bits = drops.width(),
            "telemetry config loaded"
        );
        Ok(TelemetryConfig { enabled, layout })
    }

    /// Read and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading telemetry config {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("invalid telemetry config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FormatError, LayoutError};

    #[test]
    fn empty_document_is_default() {
        assert_eq!(TelemetryConfig::from_toml_str("").unwrap(), TelemetryConfig::default());
    }

    #[test]
    fn full_document() {
        let cfg = TelemetryConfig::from_toml_str(
            r#"
            enabled = false

            [qdelay]
            mantissa_bits = 8
            exponent_bits = 4

            [drops]
            mantissa_bits = 1
            exponent_bits = 3
            "#,
        )
        .unwrap();
        assert!(!cfg.enabled);
        assert_eq!(cfg.layout.qdelay(), FloatFormat::new(8, 4).unwrap());
        assert_eq!(cfg.layout.drops().width(), 4);
    }

    #[test]
    fn rejects_bad_format() {
        let err = TelemetryConfig::from_toml_str(
            "[drops]\nmantissa_bits = 2\nexponent_bits = 0\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Format(FormatError::NoExponent)));
    }

    #[test]
    fn rejects_layout_over_16_bits() {
        let err = TelemetryConfig::from_toml_str(
            "[qdelay]\nmantissa_bits = 8\nexponent_bits = 4\n",
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Layout(LayoutError { qdelay: 12, drops: 5 })
        ));
    }

    #[test]
    fn partial_section_keeps_other_key() {
        let cfg = TelemetryConfig::from_toml_str("[drops]\nmantissa_bits = 1\n").unwrap();
        assert_eq!(cfg.layout.drops(), FloatFormat::new(1, 3).unwrap());
        assert_eq!(cfg.layout.qdelay(), FloatFormat::QDELAY);

        let cfg = TelemetryConfig::from_toml_str("[qdelay]\nexponent_bits = 3\n").unwrap();
        assert_eq!(cfg.layout.qdelay(), FloatFormat::new(7, 3).unwrap());
        assert!(cfg.enabled);
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = TelemetryConfig::from_toml_str("enable = true\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn from_file_reports_path() {
        let err = TelemetryConfig::from_file("/nonexistent/telemetry.toml").unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/telemetry.toml"));
    }
}
