//! Publish strategies for fanning a notification out to its handlers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How a notification is fanned out to its handlers.
///
/// | Strategy | Execution | Returns when | Failures |
/// |---|---|---|---|
/// | `SyncContinueOnException` | one after another | all finished | aggregated |
/// | `SyncStopOnException` | one after another | all finished or first failure | first failure |
/// | `Async` | concurrently | all finished | aggregated |
/// | `ParallelNoWait` | concurrently | immediately | discarded |
/// | `ParallelWhenAll` | concurrently | all finished | aggregated |
/// | `ParallelWhenAny` | concurrently | first finished | first finisher's failure |
///
/// `Async` and `ParallelWhenAll` share one publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PublishStrategy {
    /// Run handlers sequentially; collect every failure.
    SyncContinueOnException,
    /// Run handlers sequentially; stop at the first failure.
    SyncStopOnException,
    /// Alias of [`PublishStrategy::ParallelWhenAll`].
    #[default]
    Async,
    /// Start every handler and return without waiting.
    ParallelNoWait,
    /// Start every handler and wait for all of them.
    ParallelWhenAll,
    /// Start every handler and wait for the first to finish.
    ParallelWhenAny,
}

impl PublishStrategy {
    /// Every strategy, in numeric-code order.
    pub const ALL: [PublishStrategy; 6] = [
        PublishStrategy::SyncContinueOnException,
        PublishStrategy::SyncStopOnException,
        PublishStrategy::Async,
        PublishStrategy::ParallelNoWait,
        PublishStrategy::ParallelWhenAll,
        PublishStrategy::ParallelWhenAny,
    ];

    /// The strategy whose publisher actually serves this one.
    pub fn canonical(self) -> Self {
        match self {
            PublishStrategy::Async => PublishStrategy::ParallelWhenAll,
            other => other,
        }
    }

    /// Returns true for the strategies that run handlers one at a time.
    pub fn is_sequential(self) -> bool {
        matches!(
            self,
            PublishStrategy::SyncContinueOnException | PublishStrategy::SyncStopOnException
        )
    }

    /// Numeric code (0-5), stable across versions.
    pub fn code(self) -> u8 {
        match self {
            PublishStrategy::SyncContinueOnException => 0,
            PublishStrategy::SyncStopOnException => 1,
            PublishStrategy::Async => 2,
            PublishStrategy::ParallelNoWait => 3,
            PublishStrategy::ParallelWhenAll => 4,
            PublishStrategy::ParallelWhenAny => 5,
        }
    }

    /// Look up a strategy by numeric code.
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    /// Kebab-case name, as used in configuration.
    pub fn as_str(self) -> &'static str {
        match self {
            PublishStrategy::SyncContinueOnException => "sync-continue-on-exception",
            PublishStrategy::SyncStopOnException => "sync-stop-on-exception",
            PublishStrategy::Async => "async",
            PublishStrategy::ParallelNoWait => "parallel-no-wait",
            PublishStrategy::ParallelWhenAll => "parallel-when-all",
            PublishStrategy::ParallelWhenAny => "parallel-when-any",
        }
    }
}

impl fmt::Display for PublishStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a strategy name cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown publish strategy: {0}")]
pub struct ParseStrategyError(String);

impl FromStr for PublishStrategy {
    type Err = ParseStrategyError;

    /// Accepts kebab-case, snake_case or PascalCase names, or the numeric code.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(code) = trimmed.parse::<u8>() {
            return Self::from_code(code).ok_or_else(|| ParseStrategyError(s.to_string()));
        }

        let normalized: String = trimmed
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        Self::ALL
            .into_iter()
            .find(|strategy| strategy.as_str().replace('-', "") == normalized)
            .ok_or_else(|| ParseStrategyError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_async() {
        assert_eq!(PublishStrategy::default(), PublishStrategy::Async);
    }

    #[test]
    fn test_async_is_alias_of_when_all() {
        assert_eq!(
            PublishStrategy::Async.canonical(),
            PublishStrategy::ParallelWhenAll
        );
        assert_eq!(
            PublishStrategy::ParallelWhenAny.canonical(),
            PublishStrategy::ParallelWhenAny
        );
    }

    #[test]
    fn test_parse_accepts_common_spellings() {
        assert_eq!(
            "parallel-when-any".parse::<PublishStrategy>().unwrap(),
            PublishStrategy::ParallelWhenAny
        );
        assert_eq!(
            "SyncStopOnException".parse::<PublishStrategy>().unwrap(),
            PublishStrategy::SyncStopOnException
        );
        assert_eq!(
            "parallel_no_wait".parse::<PublishStrategy>().unwrap(),
            PublishStrategy::ParallelNoWait
        );
        assert_eq!(
            "0".parse::<PublishStrategy>().unwrap(),
            PublishStrategy::SyncContinueOnException
        );
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!("sometimes".parse::<PublishStrategy>().is_err());
        assert!("6".parse::<PublishStrategy>().is_err());
    }

    #[test]
    fn test_display_matches_serde() {
        for strategy in PublishStrategy::ALL {
            let json = serde_json::to_string(&strategy).unwrap();
            assert_eq!(json, format!("\"{}\"", strategy));
            let parsed: PublishStrategy = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, strategy);
        }
    }

    #[test]
    fn test_codes_are_positional() {
        for (index, strategy) in PublishStrategy::ALL.into_iter().enumerate() {
            assert_eq!(strategy.code() as usize, index);
            assert_eq!(PublishStrategy::from_code(index as u8), Some(strategy));
        }
    }

    #[test]
    fn test_sequential_strategies() {
        assert!(PublishStrategy::SyncContinueOnException.is_sequential());
        assert!(PublishStrategy::SyncStopOnException.is_sequential());
        assert!(!PublishStrategy::ParallelWhenAll.is_sequential());
    }
}
