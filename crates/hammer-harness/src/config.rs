//! # Harness Configuration
//!
//! Configuration for the terminal session, the stress driver and the
//! simulated terminal.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Command Line (highest priority, applied by the console)             │
//! │     hammer-pos --min-gap 5 --max-gap 8 --seed 42                        │
//! │                                                                         │
//! │  2. Environment Variables                                               │
//! │     HAMMER_POS_ID=HAMMERPOS                                             │
//! │     HAMMER_MIN_GAP_SECS=10                                              │
//! │                                                                         │
//! │  3. TOML Config File                                                    │
//! │     ~/.config/spi-hammer/hammer.toml (Linux)                            │
//! │     ~/Library/Application Support/com.spi.hammer/hammer.toml (macOS)    │
//! │                                                                         │
//! │  4. Default Values (lowest priority)                                    │
//! │     10-20s gaps, $10.00 purchases, 180s completion timeout              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # hammer.toml
//! [terminal]
//! pos_id = "HAMMERPOS"
//! eftpos_address = "10.161.104.104"
//!
//! [hammer]
//! min_gap_ms = 10000
//! max_gap_ms = 20000
//! amount_cents = 1000
//! completion_timeout_secs = 180   # 0 = wait forever
//! completion_recheck_ms = 1000
//!
//! [simulator]
//! tx_latency_ms = 3000
//! flap_interval_secs = 0          # 0 = link never drops on its own
//!
//! [logging]
//! file = "/tmp/hammer.log"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use hammer_core::validation::{validate_pos_id, validate_terminal_address};
use hammer_core::{GapRange, DEFAULT_MAX_GAP_MS, DEFAULT_MIN_GAP_MS, TEST_AMOUNT_CENTS};

use crate::error::{HarnessError, HarnessResult};

// =============================================================================
// Terminal Settings
// =============================================================================

/// Identity of this POS and where its terminal lives.
///
/// Both may be empty; the operator can set them with `pos_id:` and
/// `eftpos_address:` before pairing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TerminalSettings {
    #[serde(default)]
    pub pos_id: String,

    #[serde(default)]
    pub eftpos_address: String,
}

// =============================================================================
// Hammer Settings
// =============================================================================

/// Stress driver behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HammerSettings {
    /// Lower bound of the pause between transactions (milliseconds).
    #[serde(default = "default_min_gap")]
    pub min_gap_ms: u64,

    /// Upper bound of the pause between transactions (milliseconds).
    #[serde(default = "default_max_gap")]
    pub max_gap_ms: u64,

    /// Amount charged per generated purchase (cents).
    #[serde(default = "default_amount")]
    pub amount_cents: i64,

    /// How long to wait for a transaction to finish before treating it as
    /// stalled. Set to 0 to wait forever.
    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,

    /// How often the driver re-reads the SDK snapshot while waiting.
    #[serde(default = "default_completion_recheck")]
    pub completion_recheck_ms: u64,

    /// Seed for gap sampling (random if unset).
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_min_gap() -> u64 {
    DEFAULT_MIN_GAP_MS
}
fn default_max_gap() -> u64 {
    DEFAULT_MAX_GAP_MS
}
fn default_amount() -> i64 {
    TEST_AMOUNT_CENTS
}
fn default_completion_timeout() -> u64 {
    180
}
fn default_completion_recheck() -> u64 {
    1000
}

impl Default for HammerSettings {
    fn default() -> Self {
        HammerSettings {
            min_gap_ms: default_min_gap(),
            max_gap_ms: default_max_gap(),
            amount_cents: default_amount(),
            completion_timeout_secs: default_completion_timeout(),
            completion_recheck_ms: default_completion_recheck(),
            seed: None,
        }
    }
}

// =============================================================================
// Simulator Settings
// =============================================================================

/// Behavior of the in-process simulated terminal.
///
/// ## Outcome Weights
/// ```text
/// success_weight : failed_weight : unknown_weight
///        8       :       1       :       1        (default)
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorSettings {
    /// Delay before a paired terminal reports the link as up.
    #[serde(default = "default_connect_latency")]
    pub connect_latency_ms: u64,

    /// Delay before the terminal shows a pairing confirmation code.
    #[serde(default = "default_pairing_latency")]
    pub pairing_latency_ms: u64,

    /// Time the terminal takes to process a transaction.
    #[serde(default = "default_tx_latency")]
    pub tx_latency_ms: u64,

    #[serde(default = "default_success_weight")]
    pub success_weight: u32,

    #[serde(default = "default_minor_weight")]
    pub failed_weight: u32,

    #[serde(default = "default_minor_weight")]
    pub unknown_weight: u32,

    /// Drop the link every this many seconds (0 = never).
    #[serde(default)]
    pub flap_interval_secs: u64,

    /// Refunds stop for a signature check before completing.
    #[serde(default = "default_true")]
    pub signature_on_refund: bool,

    /// Seed for outcome draws and confirmation codes (random if unset).
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_connect_latency() -> u64 {
    500
}
fn default_pairing_latency() -> u64 {
    1500
}
fn default_tx_latency() -> u64 {
    3000
}
fn default_success_weight() -> u32 {
    8
}
fn default_minor_weight() -> u32 {
    1
}
fn default_true() -> bool {
    true
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        SimulatorSettings {
            connect_latency_ms: default_connect_latency(),
            pairing_latency_ms: default_pairing_latency(),
            tx_latency_ms: default_tx_latency(),
            success_weight: default_success_weight(),
            failed_weight: default_minor_weight(),
            unknown_weight: default_minor_weight(),
            flap_interval_secs: 0,
            signature_on_refund: true,
            seed: None,
        }
    }
}

// =============================================================================
// Logging Settings
// =============================================================================

/// Where log output goes. Stdout belongs to the operator console, so logs
/// go to stderr unless a file is configured.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete harness configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub terminal: TerminalSettings,

    #[serde(default)]
    pub hammer: HammerSettings,

    #[serde(default)]
    pub simulator: SimulatorSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl HarnessConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (hammer.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> HarnessResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading harness config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> HarnessResult<()> {
        self.gap()?;

        if self.hammer.amount_cents <= 0 {
            return Err(HarnessError::InvalidConfig(
                "hammer.amount_cents must be greater than 0".into(),
            ));
        }

        if self.hammer.completion_recheck_ms == 0 {
            return Err(HarnessError::InvalidConfig(
                "hammer.completion_recheck_ms must be greater than 0".into(),
            ));
        }

        let sim = &self.simulator;
        if sim.success_weight == 0 && sim.failed_weight == 0 && sim.unknown_weight == 0 {
            return Err(HarnessError::InvalidConfig(
                "simulator outcome weights must not all be 0".into(),
            ));
        }

        if !self.terminal.pos_id.is_empty() {
            validate_pos_id(&self.terminal.pos_id)
                .map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        }

        if !self.terminal.eftpos_address.is_empty() {
            validate_terminal_address(&self.terminal.eftpos_address)
                .map_err(|e| HarnessError::InvalidConfig(e.to_string()))?;
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("HAMMER_POS_ID") {
            debug!(pos_id = %id, "Overriding POS id from environment");
            self.terminal.pos_id = id;
        }

        if let Some(address) = lookup("HAMMER_EFTPOS_ADDRESS") {
            debug!(address = %address, "Overriding terminal address from environment");
            self.terminal.eftpos_address = address;
        }

        if let Some(secs) = lookup("HAMMER_MIN_GAP_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.hammer.min_gap_ms = s.saturating_mul(1000),
                Err(_) => warn!(value = %secs, "Ignoring non-numeric HAMMER_MIN_GAP_SECS"),
            }
        }

        if let Some(secs) = lookup("HAMMER_MAX_GAP_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.hammer.max_gap_ms = s.saturating_mul(1000),
                Err(_) => warn!(value = %secs, "Ignoring non-numeric HAMMER_MAX_GAP_SECS"),
            }
        }

        if let Some(amount) = lookup("HAMMER_AMOUNT_CENTS") {
            if let Ok(a) = amount.parse::<i64>() {
                self.hammer.amount_cents = a;
            }
        }

        if let Some(timeout) = lookup("HAMMER_COMPLETION_TIMEOUT_SECS") {
            if let Ok(t) = timeout.parse::<u64>() {
                debug!(timeout_secs = t, "Overriding completion timeout from environment");
                self.hammer.completion_timeout_secs = t;
            }
        }

        if let Some(seed) = lookup("HAMMER_SIM_SEED") {
            if let Ok(s) = seed.parse::<u64>() {
                self.simulator.seed = Some(s);
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "spi", "hammer")
            .map(|dirs| dirs.config_dir().join("hammer.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the configured gap range.
    pub fn gap(&self) -> HarnessResult<GapRange> {
        GapRange::new(self.hammer.min_gap_ms, self.hammer.max_gap_ms)
            .map_err(|e| HarnessError::InvalidConfig(e.to_string()))
    }

    /// Returns the completion timeout, or `None` to wait forever.
    pub fn completion_timeout(&self) -> Option<Duration> {
        match self.hammer.completion_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn completion_recheck(&self) -> Duration {
        Duration::from_millis(self.hammer.completion_recheck_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hammer.min_gap_ms, 10_000);
        assert_eq!(config.hammer.max_gap_ms, 20_000);
        assert_eq!(config.hammer.amount_cents, 1000);
        assert_eq!(config.completion_timeout(), Some(Duration::from_secs(180)));
        assert_eq!(config.completion_recheck(), Duration::from_secs(1));
    }

    #[test]
    fn test_config_validation() {
        let mut config = HarnessConfig::default();

        config.hammer.min_gap_ms = 0;
        assert!(config.validate().unwrap_err().is_config_error());

        config.hammer.min_gap_ms = 30_000;
        assert!(config.validate().is_err());

        config.hammer.min_gap_ms = 1000;
        config.hammer.amount_cents = 0;
        assert!(config.validate().is_err());

        config.hammer.amount_cents = 1000;
        config.terminal.pos_id = "BAD ID".into();
        assert!(config.validate().is_err());

        config.terminal.pos_id = "HAMMERPOS".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_waits_forever() {
        let mut config = HarnessConfig::default();
        config.hammer.completion_timeout_secs = 0;
        assert_eq!(config.completion_timeout(), None);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("HAMMER_POS_ID", "POS7"),
            ("HAMMER_MIN_GAP_SECS", "2"),
            ("HAMMER_MAX_GAP_SECS", "nope"),
            ("HAMMER_SIM_SEED", "42"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config.apply_overrides_from(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.terminal.pos_id, "POS7");
        assert_eq!(config.hammer.min_gap_ms, 2000);
        assert_eq!(config.hammer.max_gap_ms, 20_000);
        assert_eq!(config.simulator.seed, Some(42));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: HarnessConfig = toml::from_str(
            r#"
            [terminal]
            pos_id = "CITYPIZZA1"

            [hammer]
            min_gap_ms = 1000
            max_gap_ms = 1000
            "#,
        )
        .unwrap();

        assert_eq!(config.terminal.pos_id, "CITYPIZZA1");
        assert_eq!(config.hammer.amount_cents, 1000);
        assert_eq!(config.simulator.tx_latency_ms, 3000);
        assert!(config.gap().unwrap().is_fixed());
    }

    #[test]
    fn test_toml_serialization() {
        let config = HarnessConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[terminal]"));
        assert!(toml_str.contains("[hammer]"));
        assert!(toml_str.contains("[simulator]"));
    }
}
