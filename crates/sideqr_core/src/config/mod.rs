//! Configuration management for the scanner.
//!
//! This module provides:
//! - TOML-based configuration with logical sections
//! - Atomic file writes (write to temp, then rename)
//! - Section-level updates (only changed section is modified)
//! - Validation on load with automatic defaults
//!
//! # Example
//!
//! ```no_run
//! use sideqr_core::config::{ConfigManager, ConfigSection};
//!
//! // Create manager and load (or create default) config
//! let mut config = ConfigManager::new(".config/sideqr.toml");
//! config.load_or_create().unwrap();
//!
//! // Read settings
//! println!("Debounce: {} ms", config.settings().scanner.debounce_ms);
//!
//! // Turn the overlay off and save just that section
//! config.settings_mut().overlay.highlight_enabled = false;
//! config.update_section(ConfigSection::Overlay).unwrap();
//! ```

mod manager;
mod settings;

pub use manager::{ConfigError, ConfigManager, ConfigResult};
pub use settings::{ConfigSection, LoggingSettings, OverlaySettings, ScannerSettings, Settings};
