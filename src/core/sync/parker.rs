/*!
 * Thread Parker
 *
 * High-level parker that dispatches to the strategy chosen at creation.
 * Enum dispatch keeps the hot path free of virtual calls.
 */

use super::condvar::CondvarParker;
use super::config::{StrategyType, SyncConfig};
use super::futex::FutexParker;
use super::spinwait::SpinParker;
use super::traits::{ParkResult, Parker};
use std::time::Instant;

/// Parker with a fixed strategy
///
/// # Examples
///
/// ```
/// use queue_sync::core::sync::{ThreadParker, SyncConfig};
/// use std::time::{Duration, Instant};
///
/// let parker = ThreadParker::new(&SyncConfig::default());
/// parker.unpark();
/// assert!(parker.park(Some(Instant::now() + Duration::from_secs(1))).is_unparked());
/// ```
pub enum ThreadParker {
    Futex(FutexParker),
    Condvar(CondvarParker),
    Spin(SpinParker),
}

impl ThreadParker {
    /// Create a parker for the strategy selected by `config`
    pub fn new(config: &SyncConfig) -> Self {
        match config.select_strategy() {
            StrategyType::Futex => Self::Futex(FutexParker::new()),
            StrategyType::Condvar => Self::Condvar(CondvarParker::new()),
            StrategyType::SpinWait => Self::Spin(SpinParker::new(config.spin_duration, config.max_spins)),
            StrategyType::Auto => {
                // Should have been resolved by select_strategy
                #[cfg(target_os = "linux")]
                {
                    Self::Futex(FutexParker::new())
                }
                #[cfg(not(target_os = "linux"))]
                {
                    Self::Condvar(CondvarParker::new())
                }
            }
        }
    }

    /// Create with default configuration (auto-selects best strategy)
    pub fn with_defaults() -> Self {
        Self::new(&SyncConfig::default())
    }

    #[inline]
    fn inner(&self) -> &dyn Parker {
        match self {
            Self::Futex(p) => p,
            Self::Condvar(p) => p,
            Self::Spin(p) => p,
        }
    }

    /// Block until unparked or `deadline` passes
    #[inline]
    pub fn park(&self, deadline: Option<Instant>) -> ParkResult {
        match self {
            Self::Futex(p) => p.park(deadline),
            Self::Condvar(p) => p.park(deadline),
            Self::Spin(p) => p.park(deadline),
        }
    }

    /// Deposit the wake permit
    #[inline]
    pub fn unpark(&self) {
        match self {
            Self::Futex(p) => p.unpark(),
            Self::Condvar(p) => p.unpark(),
            Self::Spin(p) => p.unpark(),
        }
    }

    /// Consume a pending permit without blocking
    pub fn try_take(&self) -> bool {
        self.inner().try_take()
    }

    /// Get the name of the active strategy
    pub fn strategy_name(&self) -> &'static str {
        self.inner().name()
    }
}

impl std::fmt::Debug for ThreadParker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadParker")
            .field("strategy", &self.strategy_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_strategy_selection() {
        let parker = ThreadParker::new(&SyncConfig::low_latency());
        assert_eq!(parker.strategy_name(), "spinwait");

        let config = SyncConfig {
            strategy: StrategyType::Condvar,
            ..SyncConfig::default()
        };
        assert_eq!(ThreadParker::new(&config).strategy_name(), "condvar");

        #[cfg(target_os = "linux")]
        assert_eq!(ThreadParker::with_defaults().strategy_name(), "futex");
    }

    #[test]
    fn test_cross_thread_unpark_every_strategy() {
        for strategy in [StrategyType::Futex, StrategyType::Condvar, StrategyType::SpinWait] {
            let config = SyncConfig {
                strategy,
                ..SyncConfig::default()
            };
            let parker = Arc::new(ThreadParker::new(&config));
            let parker_clone = parker.clone();

            let handle = thread::spawn(move || {
                parker_clone.park(Some(Instant::now() + Duration::from_secs(5)))
            });

            thread::sleep(Duration::from_millis(20));
            parker.unpark();
            assert!(handle.join().unwrap().is_unparked(), "strategy {:?}", strategy);
        }
    }
}
