//! Settings struct with TOML-based sections.
//!
//! Settings are organized into logical sections that map to TOML tables.
//! Each section can be updated independently for atomic section-level updates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogLevel;
use crate::overlay::OverlayStyle;

/// Root settings structure containing all configuration sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Decode and debounce settings.
    #[serde(default)]
    pub scanner: ScannerSettings,

    /// Overlay rendering settings.
    #[serde(default)]
    pub overlay: OverlaySettings,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Replace out-of-range values with defaults.
    ///
    /// Returns the names of the fields that were reset.
    pub fn sanitize(&mut self) -> Vec<&'static str> {
        let mut reset = Vec::new();

        if self.scanner.debounce_ms == 0 {
            self.scanner.debounce_ms = default_debounce_ms();
            reset.push("scanner.debounce_ms");
        }
        if self.scanner.idle_poll_ms == 0 {
            self.scanner.idle_poll_ms = default_idle_poll_ms();
            reset.push("scanner.idle_poll_ms");
        }
        if self.overlay.stroke_width == 0 {
            self.overlay.stroke_width = default_stroke_width();
            reset.push("overlay.stroke_width");
        }

        reset
    }
}

/// Decode worker and reconciliation configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerSettings {
    /// How long a code stays visible after its last sighting (ms).
    /// Also the overlay fade duration.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long the worker waits on an empty mailbox before re-checking
    /// for shutdown (ms).
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

fn default_debounce_ms() -> u64 {
    1000
}

fn default_idle_poll_ms() -> u64 {
    50
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl ScannerSettings {
    /// Debounce period as a duration.
    pub fn debounce_period(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Idle poll interval as a duration.
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

/// Overlay configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlaySettings {
    /// Draw outlines around detected codes.
    #[serde(default = "default_true")]
    pub highlight_enabled: bool,

    /// Outline color as [r, g, b].
    #[serde(default = "default_stroke_rgb")]
    pub stroke_rgb: [u8; 3],

    /// Outline thickness in pixels.
    #[serde(default = "default_stroke_width")]
    pub stroke_width: u32,
}

fn default_true() -> bool {
    true
}

fn default_stroke_rgb() -> [u8; 3] {
    OverlayStyle::default().color
}

fn default_stroke_width() -> u32 {
    OverlayStyle::default().stroke_width
}

impl Default for OverlaySettings {
    fn default() -> Self {
        Self {
            highlight_enabled: true,
            stroke_rgb: default_stroke_rgb(),
            stroke_width: default_stroke_width(),
        }
    }
}

impl OverlaySettings {
    /// Outline style for the compositor.
    pub fn style(&self) -> OverlayStyle {
        OverlayStyle {
            color: self.stroke_rgb,
            stroke_width: self.stroke_width,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Default log level when RUST_LOG is not set.
    #[serde(default)]
    pub level: LogLevel,
}

/// Names of config sections for targeted updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigSection {
    Scanner,
    Overlay,
    Logging,
}

impl ConfigSection {
    /// All sections, in file order.
    pub const ALL: [ConfigSection; 3] = [Self::Scanner, Self::Overlay, Self::Logging];

    /// Get the TOML table name for this section.
    pub fn table_name(&self) -> &'static str {
        match self {
            ConfigSection::Scanner => "scanner",
            ConfigSection::Overlay => "overlay",
            ConfigSection::Logging => "logging",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_serializes() {
        let settings = Settings::default();
        let toml = toml::to_string_pretty(&settings).unwrap();
        assert!(toml.contains("[scanner]"));
        assert!(toml.contains("[overlay]"));
        assert!(toml.contains("debounce_ms = 1000"));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let minimal = "[scanner]\ndebounce_ms = 750";
        let parsed: Settings = toml::from_str(minimal).unwrap();
        assert_eq!(parsed.scanner.debounce_period(), Duration::from_millis(750));
        assert_eq!(parsed.scanner.idle_poll_ms, 50);
        assert!(parsed.overlay.highlight_enabled);
        assert_eq!(parsed.logging.level, LogLevel::Info);
    }

    #[test]
    fn sanitize_resets_zero_values() {
        let mut settings = Settings::default();
        settings.scanner.debounce_ms = 0;
        settings.overlay.stroke_width = 0;

        let reset = settings.sanitize();

        assert_eq!(reset, vec!["scanner.debounce_ms", "overlay.stroke_width"]);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn overlay_style_follows_settings() {
        let overlay = OverlaySettings {
            highlight_enabled: true,
            stroke_rgb: [1, 2, 3],
            stroke_width: 2,
        };
        assert_eq!(
            overlay.style(),
            OverlayStyle {
                color: [1, 2, 3],
                stroke_width: 2
            }
        );
    }
}
