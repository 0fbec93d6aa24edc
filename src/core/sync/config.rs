/*!
 * Synchronization Configuration
 *
 * Runtime configuration for parking strategy selection
 */

use crate::core::limits::{DEFAULT_MAX_SPINS, DEFAULT_SPIN_DURATION};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Strategy type selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyType {
    /// Futex-based (parking_lot_core, fastest on Linux)
    Futex,
    /// Condvar-based (cross-platform, reliable)
    Condvar,
    /// Adaptive spinwait (low-latency, high-CPU for short waits)
    SpinWait,
    /// Auto-select based on platform
    Auto,
}

impl StrategyType {
    /// Parse a strategy name as used by `QSYNC_PARK_STRATEGY`
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "futex" => Some(Self::Futex),
            "condvar" => Some(Self::Condvar),
            "spin" | "spinwait" | "spin_wait" => Some(Self::SpinWait),
            "auto" => Some(Self::Auto),
            _ => None,
        }
    }
}

/// Synchronization configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Preferred strategy
    pub strategy: StrategyType,
    /// Spin duration before parking (for SpinWait)
    pub spin_duration: Duration,
    /// Maximum spin iterations before giving up
    pub max_spins: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

static DEFAULT_CONFIG: RwLock<SyncConfig> = RwLock::new(SyncConfig::DEFAULT);

impl SyncConfig {
    /// Auto-selected strategy with default spin settings
    pub const DEFAULT: Self = Self {
        strategy: StrategyType::Auto,
        spin_duration: DEFAULT_SPIN_DURATION,
        max_spins: DEFAULT_MAX_SPINS,
    };

    /// Configuration optimized for low-latency (< 1ms wait expected)
    pub const fn low_latency() -> Self {
        Self {
            strategy: StrategyType::SpinWait,
            spin_duration: Duration::from_micros(50),
            max_spins: 500,
        }
    }

    /// Configuration optimized for long waits (> 1ms expected)
    pub const fn long_wait() -> Self {
        Self {
            strategy: StrategyType::Auto,
            spin_duration: Duration::from_micros(1),
            max_spins: 10,
        }
    }

    /// Build a configuration from the environment
    ///
    /// Environment variables:
    /// - QSYNC_PARK_STRATEGY: futex | condvar | spin | auto (default: auto)
    /// - QSYNC_SPIN_MICROS: spin duration in microseconds
    /// - QSYNC_MAX_SPINS: maximum spin iterations
    ///
    /// Unparseable values fall back to the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::DEFAULT;

        if let Some(strategy) = std::env::var("QSYNC_PARK_STRATEGY")
            .ok()
            .and_then(|v| StrategyType::parse(&v))
        {
            config.strategy = strategy;
        }
        if let Some(micros) = std::env::var("QSYNC_SPIN_MICROS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.spin_duration = Duration::from_micros(micros);
        }
        if let Some(spins) = std::env::var("QSYNC_MAX_SPINS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.max_spins = spins;
        }

        config
    }

    /// Select best strategy for current platform
    pub fn select_strategy(&self) -> StrategyType {
        match self.strategy {
            StrategyType::Auto => {
                // Prefer futex on Linux, condvar elsewhere
                #[cfg(target_os = "linux")]
                {
                    StrategyType::Futex
                }
                #[cfg(not(target_os = "linux"))]
                {
                    StrategyType::Condvar
                }
            }
            other => other,
        }
    }
}

/// Replace the process-wide default configuration
///
/// Applies to threads whose handle is created afterwards; a thread's parker
/// is fixed when its handle is first materialized.
pub fn set_default_config(config: SyncConfig) {
    *DEFAULT_CONFIG.write() = config;
}

/// Current process-wide default configuration
pub fn default_config() -> SyncConfig {
    DEFAULT_CONFIG.read().clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strategy() {
        assert_eq!(StrategyType::parse("Futex"), Some(StrategyType::Futex));
        assert_eq!(StrategyType::parse(" spin "), Some(StrategyType::SpinWait));
        assert_eq!(StrategyType::parse("condvar"), Some(StrategyType::Condvar));
        assert_eq!(StrategyType::parse("bogus"), None);
    }

    #[test]
    fn test_auto_resolves() {
        let resolved = SyncConfig::default().select_strategy();
        assert_ne!(resolved, StrategyType::Auto);
        assert_eq!(
            SyncConfig::low_latency().select_strategy(),
            StrategyType::SpinWait
        );
    }

    #[test]
    fn test_long_wait_profile() {
        let config = SyncConfig::long_wait();
        assert!(config.spin_duration < SyncConfig::low_latency().spin_duration);
        assert!(config.max_spins < SyncConfig::DEFAULT.max_spins);
        assert_ne!(config.select_strategy(), StrategyType::SpinWait);
        assert_ne!(config.select_strategy(), StrategyType::Auto);
    }

    #[test]
    fn test_config_serde() {
        let config = SyncConfig::low_latency();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"spin_wait\""));
        let back: SyncConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
