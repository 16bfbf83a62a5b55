//! Configuration for model calls, failover and transcription

use std::fmt;
use std::path::Path;
use std::time::Duration;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::failover::RetryPolicy;

pub const DEFAULT_API_BASE: &str
  = "https://generativelanguage.googleapis.com";

/// Model selection and sampling defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig
{   /// Model for cleaning, notes and templates
    pub default_model: String
  , /// Model for audio transcription
    pub transcription_model: String
  , /// Tried in order after the primary when it is rate limited
    pub fallback_models: Vec<String>
  , pub temperature: f32
  , pub top_p: f32
  , pub max_tokens_cleaner: u32
  , pub max_tokens_note: u32
  , pub max_tokens_transcription: u32
}

impl Default for GenerationConfig
{   fn default() -> Self
    {   GenerationConfig
        {   default_model: "gemini-2.5-flash".to_string()
          , transcription_model: "gemini-2.5-flash".to_string()
          , fallback_models: vec![
              "gemini-2.5-flash-lite".to_string()
            , "gemini-2.5-flash".to_string()
            , "gemini-3.0-flash".to_string()
            ]
          , temperature: 0.2
          , top_p: 0.95
          , max_tokens_cleaner: 1024
          , max_tokens_note: 2048
          , max_tokens_transcription: 2048
        }
    }
}

/// Failover configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FailoverConfig
{   /// Max attempts per candidate model
    pub max_retries: usize
  , /// Backoff multiplier for retries
    pub backoff_multiplier: f64
  , /// First backoff, in seconds
    pub initial_backoff_secs: f64
}

impl FailoverConfig
{   pub fn retry_policy(&self) -> RetryPolicy
    {   RetryPolicy::new(
          self.max_retries
        , self.backoff_multiplier
        , secs_to_duration(self.initial_backoff_secs)
        )
    }
}

impl Default for FailoverConfig
{   fn default() -> Self
    {   FailoverConfig
        {   max_retries: 3
          , backoff_multiplier: 2.0
          , initial_backoff_secs: 2.0
        }
    }
}

/// Audio transcription settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig
{   /// Seconds between upload status checks
    pub poll_interval_secs: f64
  , pub temperature: f32
}

impl TranscriptionConfig
{   pub fn poll_interval(&self) -> Duration
    {   secs_to_duration(self.poll_interval_secs)
    }
}

impl Default for TranscriptionConfig
{   fn default() -> Self
    {   TranscriptionConfig
        {   poll_interval_secs: 2.0
          , temperature: 0.1
        }
    }
}

/// Remote provider access
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig
{   pub api_key: Option<String>
  , pub api_base: String
  , /// Per-request HTTP timeout in seconds
    pub timeout_secs: Option<u64>
}

impl Default for ProviderConfig
{   fn default() -> Self
    {   ProviderConfig
        {   api_key: None
          , api_base: DEFAULT_API_BASE.to_string()
          , timeout_secs: Some(120)
        }
    }
}

impl fmt::Debug for ProviderConfig
{   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {   f.debug_struct("ProviderConfig")
          .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
          .field("api_base", &self.api_base)
          .field("timeout_secs", &self.timeout_secs)
          .finish()
    }
}

/// medscribe configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{   pub generation: GenerationConfig
  , pub failover: FailoverConfig
  , pub transcription: TranscriptionConfig
  , pub provider: ProviderConfig
}

impl Config
{   /// Defaults overlaid with the process environment (and `.env`)
    pub fn from_env() -> Result<Self>
    {   if let Ok(path) = dotenvy::dotenv()
        {   debug!("Loaded environment from {}", path.display());
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns per variable
    pub fn from_lookup(
      lookup: impl Fn(&str) -> Option<String>
    ) -> Result<Self>
    {   let mut config = Config::default();
        config.apply_lookup(lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON file, then let the environment fill in the key
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self>
    {   let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let mut config: Config = serde_json::from_str(&raw)?;
        if config.provider.api_key.is_none()
        {   config.provider.api_key = std::env::var("GEMINI_API_KEY").ok();
        }
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    fn apply_lookup(
      &mut self
    , lookup: impl Fn(&str) -> Option<String>
    ) -> Result<()>
    {   if let Some(key) = lookup("GEMINI_API_KEY")
        {   self.provider.api_key = Some(key);
        }
        if let Some(base) = lookup("GEMINI_API_BASE")
        {   self.provider.api_base = base;
        }
        if let Some(model) = lookup("GEMINI_MODEL")
        {   self.generation.default_model = model;
        }
        if let Some(model) = lookup("GEMINI_TRANSCRIPTION_MODEL")
        {   self.generation.transcription_model = model;
        }
        if let Some(list) = lookup("MEDSCRIBE_FALLBACK_MODELS")
        {   self.generation.fallback_models = list
              .split(',')
              .map(str::trim)
              .filter(|m| !m.is_empty())
              .map(str::to_string)
              .collect();
        }
        if let Some(raw) = lookup("MEDSCRIBE_MAX_RETRIES")
        {   self.failover.max_retries = parse_var("MEDSCRIBE_MAX_RETRIES", &raw)?;
        }
        if let Some(raw) = lookup("MEDSCRIBE_REQUEST_TIMEOUT_SECS")
        {   self.provider.timeout_secs
              = Some(parse_var("MEDSCRIBE_REQUEST_TIMEOUT_SECS", &raw)?);
        }
        Ok(())
    }

    /// Reject values the orchestrator cannot work with
    pub fn validate(&self) -> Result<()>
    {   if self.failover.max_retries == 0
        {   return Err(Error::InvalidConfiguration(
              "failover.max_retries must be at least 1".to_string()
            ));
        }
        check_secs("failover.initial_backoff_secs", self.failover.initial_backoff_secs)?;
        if !(self.failover.backoff_multiplier >= 1.0
          && self.failover.backoff_multiplier.is_finite())
        {   return Err(Error::InvalidConfiguration(
              "failover.backoff_multiplier must be >= 1".to_string()
            ));
        }
        for (name, value) in [
          ("generation.temperature", self.generation.temperature)
        , ("generation.top_p", self.generation.top_p)
        , ("transcription.temperature", self.transcription.temperature)
        ]
        {   if !(0.0..=1.0).contains(&value)
            {   return Err(Error::InvalidConfiguration(
                  format!("{} must be within [0, 1], got {}", name, value)
                ));
            }
        }
        check_secs("transcription.poll_interval_secs", self.transcription.poll_interval_secs)?;
        if self.generation.default_model.trim().is_empty()
        {   return Err(Error::InvalidConfiguration(
              "generation.default_model is empty".to_string()
            ));
        }
        Ok(())
    }

    /// API key, or the startup error if it was never configured
    pub fn require_api_key(&self) -> Result<&str>
    {   self.provider.api_key
          .as_deref()
          .filter(|k| !k.trim().is_empty())
          .ok_or_else(|| Error::MissingApiKey("GEMINI_API_KEY".to_string()))
    }
}

/// A seconds value must convert to a `Duration`
fn check_secs(name: &str, secs: f64) -> Result<()>
{   Duration::try_from_secs_f64(secs)
      .map(|_| ())
      .map_err(|e| Error::InvalidConfiguration(format!("{} = {}: {}", name, secs, e)))
}

/// Unvalidated values saturate instead of panicking
fn secs_to_duration(secs: f64) -> Duration
{   Duration::try_from_secs_f64(secs).unwrap_or(
      if secs > 0.0 { Duration::MAX } else { Duration::ZERO }
    )
}

fn parse_var<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T>
where
  T::Err: fmt::Display
{   raw.trim().parse().map_err(|e| {
      Error::InvalidConfiguration(format!("{}={:?}: {}", name, raw, e))
    })
}

#[cfg(test)]
mod tests
{   use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String>
    {   let map: HashMap<String, String> = pairs
          .iter()
          .map(|(k, v)| (k.to_string(), v.to_string()))
          .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_the_documented_values()
    {   let config = Config::default();
        assert_eq!(config.failover.retry_policy(), RetryPolicy::default());
        assert_eq!(config.generation.fallback_models.len(), 3);
        assert_eq!(config.transcription.poll_interval(), Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn environment_overrides_models_and_retries()
    {   let config = Config::from_lookup(lookup_from(&[
          ("GEMINI_API_KEY", "secret")
        , ("GEMINI_MODEL", "gemini-x")
        , ("MEDSCRIBE_FALLBACK_MODELS", "a, b,,c")
        , ("MEDSCRIBE_MAX_RETRIES", "5")
        ])).unwrap();
        assert_eq!(config.require_api_key().unwrap(), "secret");
        assert_eq!(config.generation.default_model, "gemini-x");
        assert_eq!(config.generation.fallback_models, vec!["a", "b", "c"]);
        assert_eq!(config.failover.max_retries, 5);
    }

    #[test]
    fn bad_numbers_are_configuration_errors()
    {   let err = Config::from_lookup(lookup_from(&[
          ("MEDSCRIBE_MAX_RETRIES", "lots")
        ])).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));
    }

    #[test]
    fn zero_retries_rejected()
    {   let err = Config::from_lookup(lookup_from(&[
          ("MEDSCRIBE_MAX_RETRIES", "0")
        ])).unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }

    #[test]
    fn durations_that_do_not_fit_are_rejected()
    {   let mut config = Config::default();
        config.failover.initial_backoff_secs = 1e20;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("initial_backoff_secs"));
        assert_eq!(config.failover.retry_policy().initial_backoff, Duration::MAX);

        let mut config = Config::default();
        config.transcription.poll_interval_secs = -1.0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfiguration(_))));

        let mut config = Config::default();
        config.transcription.poll_interval_secs = f64::NAN;
        assert!(config.validate().is_err());
        assert_eq!(config.transcription.poll_interval(), Duration::ZERO);
    }

    #[test]
    fn missing_key_surfaces_at_startup()
    {   let config = Config::from_lookup(lookup_from(&[])).unwrap();
        assert!(matches!(
          config.require_api_key(),
          Err(Error::MissingApiKey(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_key()
    {   let mut config = Config::default();
        config.provider.api_key = Some("super-secret".to_string());
        let printed = format!("{:?}", config);
        assert!(!printed.contains("super-secret"));
    }

    #[test]
    fn partial_json_falls_back_to_defaults()
    {   let config: Config = serde_json::from_str(
          r#"{"failover": {"max_retries": 4}}"#
        ).unwrap();
        assert_eq!(config.failover.max_retries, 4);
        assert_eq!(config.failover.initial_backoff_secs, 2.0);
        assert_eq!(config.generation, GenerationConfig::default());
    }
}
