//! Failover and retry logic for model fallbacks

use std::time::Duration;
use log::debug;
use serde::{Deserialize, Serialize};

/// How a failed model call should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind
{   /// Capacity or quota exhausted; move on to the next model
    RateLimited
  , /// Network hiccup; retry the same model after a backoff
    Transient
  , /// Anything else; give up immediately
    Fatal
}

const RATE_LIMIT_MARKERS: &[&str] = &[
  "rate limit"
, "quota"
, "resource exhausted"
, "429"
, "too many requests"
];

// 10013: socket access denied, 11001: host not found (WSA codes)
const TRANSIENT_MARKERS: &[&str] = &[
  "10013"
, "11001"
, "timeout"
];

/// Classify a raw provider error message.
///
/// Substring heuristic, case-insensitive. Rate-limit markers win over
/// network markers, so "429 ... timeout" is a rate limit.
pub fn classify_error(message: &str) -> ErrorKind
{   let lower = message.to_lowercase();
    if RATE_LIMIT_MARKERS.iter().any(|m| lower.contains(m))
    {   ErrorKind::RateLimited
    } else if TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
    {   ErrorKind::Transient
    } else
    {   ErrorKind::Fatal
    }
}

/// Retry policy applied to each candidate model
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy
{   pub max_retries: usize
  , pub backoff_multiplier: f64
  , pub initial_backoff: Duration
}

impl RetryPolicy
{   /// Create a new retry policy
    pub fn new(
      max_retries: usize
    , backoff_multiplier: f64
    , initial_backoff: Duration
    ) -> Self
    {   RetryPolicy
        {   max_retries
          , backoff_multiplier
          , initial_backoff
        }
    }

    /// Delay to wait after the failed attempt with index `attempt`
    /// (zero based). No ceiling is applied; a delay too large for
    /// `Duration` saturates to `Duration::MAX`.
    pub fn backoff_for_attempt(
      &self
    , attempt: usize
    ) -> Duration
    {   if self.initial_backoff.is_zero()
        {   return Duration::ZERO;
        }
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let multiplier = self.backoff_multiplier.powi(exp);
        debug!(
          "Backoff for attempt {}: x{}",
          attempt, multiplier
        );
        Duration::try_from_secs_f64(self.initial_backoff.as_secs_f64() * multiplier)
          .unwrap_or(Duration::MAX)
    }
}

impl Default for RetryPolicy
{   fn default() -> Self
    {   RetryPolicy::new(3, 2.0, Duration::from_secs(2))
    }
}

/// Ordered models tried for one request: primary first, then the
/// configured fallbacks, duplicates removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSequence
{   models: Vec<String>
}

impl CandidateSequence
{   pub fn build(
      primary: &str
    , fallbacks: &[String]
    ) -> Self
    {   let mut models = vec![primary.to_string()];
        for model in fallbacks
        {   if !models.contains(model)
            {   models.push(model.clone());
            }
        }
        debug!(
          "Candidate sequence for {}: {:?}",
          primary, models
        );
        CandidateSequence { models }
    }

    pub fn models(&self) -> &[String]
    {   &self.models
    }

    pub fn primary(&self) -> &str
    {   // build() always seeds the primary
        self.models.first().map_or("", String::as_str)
    }

    pub fn len(&self) -> usize
    {   self.models.len()
    }

    pub fn is_empty(&self) -> bool
    {   self.models.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String>
    {   self.models.iter()
    }
}

impl<'a> IntoIterator for &'a CandidateSequence
{   type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter
    {   self.models.iter()
    }
}

#[cfg(test)]
mod tests
{   use super::*;

    fn names(list: &[&str]) -> Vec<String>
    {   list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn primary_listed_among_fallbacks_is_not_repeated()
    {   let seq = CandidateSequence::build(
          "m"
        , &names(&["f1", "m", "f3"])
        );
        assert_eq!(seq.models(), names(&["m", "f1", "f3"]).as_slice());
        assert_eq!(seq.primary(), "m");
    }

    #[test]
    fn duplicate_fallbacks_collapse()
    {   let seq = CandidateSequence::build(
          "a"
        , &names(&["b", "b", "c", "a"])
        );
        assert_eq!(seq.models(), names(&["a", "b", "c"]).as_slice());
    }

    #[test]
    fn empty_fallback_list_keeps_primary_only()
    {   let seq = CandidateSequence::build("solo", &[]);
        assert_eq!(seq.len(), 1);
    }

    #[test]
    fn classifies_rate_limits()
    {   for msg in [
          "429 Too Many Requests"
        , "RESOURCE EXHAUSTED: try later"
        , "Quota exceeded for project"
        , "Rate Limit reached"
        ]
        {   assert_eq!(classify_error(msg), ErrorKind::RateLimited, "{msg}");
        }
    }

    #[test]
    fn classifies_network_errors()
    {   assert_eq!(classify_error("[WinError 10013] denied"), ErrorKind::Transient);
        assert_eq!(classify_error("getaddrinfo 11001"), ErrorKind::Transient);
        assert_eq!(classify_error("Read TIMEOUT"), ErrorKind::Transient);
    }

    #[test]
    fn everything_else_is_fatal()
    {   assert_eq!(classify_error("HTTP 400: invalid argument"), ErrorKind::Fatal);
        assert_eq!(classify_error("connection refused"), ErrorKind::Fatal);
    }

    #[test]
    fn backoff_doubles_without_ceiling()
    {   let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for_attempt(0), Duration::from_secs(2));
        assert_eq!(policy.backoff_for_attempt(1), Duration::from_secs(4));
        assert_eq!(policy.backoff_for_attempt(5), Duration::from_secs(64));
    }

    #[test]
    fn huge_attempt_counts_saturate_instead_of_panicking()
    {   let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for_attempt(5_000), Duration::MAX);

        let instant = RetryPolicy::new(10_000, 2.0, Duration::ZERO);
        assert_eq!(instant.backoff_for_attempt(5_000), Duration::ZERO);
    }
}
