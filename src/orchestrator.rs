//! Retry and model-fallback loop around a [`ModelBackend`]

use std::sync::Arc;
use std::time::{Duration, Instant};
use async_trait::async_trait;
use log::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::failover::{CandidateSequence, ErrorKind, RetryPolicy};
use crate::providers::ModelBackend;
use crate::request::{AttemptOutcome, GenerationRequest, GenerationResult, ModelAttempt};

/// Where backoff waits go. Swapped out in tests to observe delays.
#[async_trait]
pub trait Sleeper: Send + Sync
{   async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper
{   async fn sleep(&self, duration: Duration)
    {   tokio::time::sleep(duration).await;
    }
}

/// Issues generation requests with retry, backoff and model fallback.
///
/// Holds only read-only configuration; every call to
/// [`Orchestrator::generate`] runs its own attempt sequence.
pub struct Orchestrator
{   backend: Arc<dyn ModelBackend>
  , sleeper: Arc<dyn Sleeper>
  , fallback_models: Vec<String>
  , retry_policy: RetryPolicy
  , default_temperature: f32
  , default_top_p: f32
}

impl Orchestrator
{   pub fn new(
      backend: Arc<dyn ModelBackend>
    , config: &Config
    ) -> Result<Self>
    {   Self::with_sleeper(backend, Arc::new(TokioSleeper), config)
    }

    pub fn with_sleeper(
      backend: Arc<dyn ModelBackend>
    , sleeper: Arc<dyn Sleeper>
    , config: &Config
    ) -> Result<Self>
    {   config.validate()?;
        Ok(Orchestrator
        {   backend
          , sleeper
          , fallback_models: config.generation.fallback_models.clone()
          , retry_policy: config.failover.retry_policy()
          , default_temperature: config.generation.temperature
          , default_top_p: config.generation.top_p
        })
    }

    pub fn retry_policy(&self) -> &RetryPolicy
    {   &self.retry_policy
    }

    /// Candidate models for a request whose primary is `primary`
    pub fn candidates(&self, primary: &str) -> CandidateSequence
    {   CandidateSequence::build(primary, &self.fallback_models)
    }

    /// Run `request` to a terminal result.
    ///
    /// Rate-limited models are abandoned after one attempt; transient
    /// errors are retried on the same model with exponential backoff;
    /// anything else is returned as [`Error::Call`] right away. When every
    /// candidate ends rate limited the result is
    /// [`Error::RateLimitExhausted`].
    pub async fn generate(
      &self
    , request: &GenerationRequest
    ) -> Result<GenerationResult>
    {   let temperature = request.temperature.unwrap_or(self.default_temperature);
        let top_p = request.top_p.unwrap_or(self.default_top_p);
        check_unit_range("temperature", temperature)?;
        check_unit_range("top_p", top_p)?;

        let candidates = self.candidates(&request.primary_model);
        let max_retries = self.retry_policy.max_retries;
        let started = Instant::now();

        for model in &candidates
        {   for attempt in 0..max_retries
            {   let outcome = self.backend
                  .generate(
                    model
                  , &request.contents
                  , request.max_output_tokens
                  , temperature
                  , top_p
                  )
                  .await;

                match outcome
                {   Ok(text) => {
                      log_attempt(&ModelAttempt
                      {   model_name: model.clone()
                        , attempt_number: attempt + 1
                        , outcome: AttemptOutcome::Success
                      });
                      if model != &request.primary_model
                      {   info!("Successfully used fallback model: {}", model);
                      }
                      return Ok(GenerationResult
                      {   text: text.trim().to_string()
                        , model: model.clone()
                        , generation_time_seconds: started.elapsed().as_secs_f64()
                      });
                    }
                  , Err(e) => match e.kind
                    {   ErrorKind::RateLimited => {
                          log_attempt(&ModelAttempt
                          {   model_name: model.clone()
                            , attempt_number: attempt + 1
                            , outcome: AttemptOutcome::RateLimited
                          });
                          warn!("Rate limit hit on {}, trying next model...", model);
                          break;
                        }
                      , ErrorKind::Transient if attempt + 1 < max_retries => {
                          log_attempt(&ModelAttempt
                          {   model_name: model.clone()
                            , attempt_number: attempt + 1
                            , outcome: AttemptOutcome::TransientFailure(e.message.clone())
                          });
                          let delay = self.retry_policy.backoff_for_attempt(attempt);
                          warn!(
                            "API call failed (attempt {}/{}): {}; retrying in {:?}",
                            attempt + 1, max_retries, e.message, delay
                          );
                          self.sleeper.sleep(delay).await;
                        }
                      , kind => {
                          let outcome = if kind == ErrorKind::Transient
                          {   AttemptOutcome::TransientFailure(e.message.clone())
                          } else
                          {   AttemptOutcome::FatalFailure(e.message.clone())
                          };
                          log_attempt(&ModelAttempt
                          {   model_name: model.clone()
                            , attempt_number: attempt + 1
                            , outcome
                          });
                          return Err(Error::Call(e));
                        }
                    }
                }
            }
            // leaving the attempt loop without returning means rate limited
        }

        warn!(
          "All models rate limited: {}",
          candidates.models().join(", ")
        );
        Err(Error::RateLimitExhausted
        {   models: candidates.models().to_vec()
        })
    }
}

fn log_attempt(attempt: &ModelAttempt)
{   debug!(
      "{} attempt {}: {:?}",
      attempt.model_name, attempt.attempt_number, attempt.outcome
    );
}

fn check_unit_range(name: &str, value: f32) -> Result<()>
{   if (0.0..=1.0).contains(&value)
    {   Ok(())
    } else
    {   Err(Error::InvalidInput(
          format!("{} must be within [0, 1], got {}", name, value)
        ))
    }
}
