use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use log::{debug, error, info};
use serde_json::{json, Map, Value};

use crate::config::{Config, GenerationConfig};
use crate::error::{Error, Result};
use crate::extract::{count_fields, parse_json_object};
use crate::orchestrator::{Orchestrator, Sleeper, TokioSleeper};
use crate::prompts;
use crate::providers::{FileStore, GeminiClient, ModelBackend};
use crate::request::{Envelope, GenerationRequest, GenerationResult, Note, TemplateFields, Transcription};
use crate::templates::{validate_template_name, InMemoryTemplateStore, Template, TemplateStore};
use crate::transcription::Transcriber;

/// Shortest document text worth sending for template extraction
pub const MIN_DOCUMENT_CHARS: usize = 50;

/// Caller-facing operations. Every method returns an [`Envelope`];
/// failures are reported in it, never raised.
pub struct ScribeClient
{   orchestrator: Arc<Orchestrator>
  , transcriber: Transcriber
  , templates: Arc<dyn TemplateStore>
  , generation: GenerationConfig
}

impl ScribeClient
{   pub fn new(
      config: &Config
    , backend: Arc<dyn ModelBackend>
    , files: Arc<dyn FileStore>
    , templates: Arc<dyn TemplateStore>
    ) -> Result<Self>
    {   Self::with_sleeper(config, backend, files, templates, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(
      config: &Config
    , backend: Arc<dyn ModelBackend>
    , files: Arc<dyn FileStore>
    , templates: Arc<dyn TemplateStore>
    , sleeper: Arc<dyn Sleeper>
    ) -> Result<Self>
    {   let orchestrator = Arc::new(
          Orchestrator::with_sleeper(backend, sleeper.clone(), config)?
        );
        let transcriber = Transcriber::new(
          orchestrator.clone(), files, sleeper, config
        );
        debug!(
          "ScribeClient ready (model {}, transcription model {})",
          config.generation.default_model,
          config.generation.transcription_model
        );
        Ok(ScribeClient
        {   orchestrator
          , transcriber
          , templates
          , generation: config.generation.clone()
        })
    }

    /// Gemini for generation and uploads, built-in templates in memory.
    /// Fails at startup when the API key is missing.
    pub fn from_gemini(config: &Config) -> Result<Self>
    {   Self::from_gemini_with_templates(
          config
        , Arc::new(InMemoryTemplateStore::with_defaults())
        )
    }

    /// Gemini for generation and uploads, templates from `templates`
    pub fn from_gemini_with_templates(
      config: &Config
    , templates: Arc<dyn TemplateStore>
    ) -> Result<Self>
    {   let gemini = Arc::new(GeminiClient::new(&config.provider)?);
        info!("Gemini initialized with model: {}", config.generation.default_model);
        Self::new(config, gemini.clone(), gemini, templates)
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore>
    {   &self.templates
    }

    pub fn orchestrator(&self) -> &Orchestrator
    {   &self.orchestrator
    }

    // ===== Operations =====

    pub async fn clean(&self, transcribed_text: &str) -> Envelope<String>
    {   let started = Instant::now();
        report("clean", Envelope::from_result(self.clean_text(transcribed_text).await, started))
    }

    pub async fn generate_note(
      &self
    , cleaned_text: &str
    , template_fields: &Map<String, Value>
    ) -> Envelope<Note>
    {   let started = Instant::now();
        let result = self.note(cleaned_text, template_fields).await;
        report("generate_note", Envelope::from_result(result, started))
    }

    pub async fn generate_note_from_template(
      &self
    , cleaned_text: &str
    , template_name: &str
    ) -> Envelope<Note>
    {   let started = Instant::now();
        let result = match self.templates.get_template(template_name).await
        {   Some(fields) => self.note(cleaned_text, &fields).await
          , None => Err(Error::TemplateNotFound(template_name.to_string()))
        };
        report("generate_note", Envelope::from_result(result, started))
    }

    pub async fn extract_template_fields(&self, document_text: &str) -> Envelope<TemplateFields>
    {   let started = Instant::now();
        let result = self.template_fields(document_text).await;
        report("extract_template_fields", Envelope::from_result(result, started))
    }

    /// Extract fields from `document_text` and store them under `template_name`
    pub async fn create_template_from_document(
      &self
    , document_text: &str
    , template_name: &str
    ) -> Envelope<TemplateFields>
    {   let started = Instant::now();
        let result = self.create_template(document_text, template_name).await;
        report("create_template", Envelope::from_result(result, started))
    }

    pub async fn transcribe(&self, audio_path: &Path) -> Envelope<Transcription>
    {   let started = Instant::now();
        let result = self.transcriber.transcribe(audio_path).await;
        report("transcribe", Envelope::from_result(result, started))
    }

    /// Transcribe then clean; the payload is the cleaned transcript
    pub async fn transcribe_and_clean(&self, audio_path: &Path) -> Envelope<String>
    {   let started = Instant::now();
        let result = async {
          let transcription = self.transcriber.transcribe(audio_path).await?;
          self.clean_text(&transcription.text).await
        }.await;
        report("transcribe_and_clean", Envelope::from_result(result, started))
    }

    // ===== Internals =====

    async fn clean_text(&self, transcribed_text: &str) -> Result<String>
    {   if transcribed_text.trim().is_empty()
        {   return Err(Error::InvalidInput("Input text is empty".to_string()));
        }
        let result = self.run(
          prompts::text_cleaner(transcribed_text)
        , self.generation.max_tokens_cleaner
        ).await?;
        if result.text.is_empty()
        {   error!("Model returned empty cleaned text");
            return Err(Error::EmptyOutput);
        }
        info!(
          "Formatted: {} chars in {:.2}s",
          result.text.chars().count(), result.generation_time_seconds
        );
        Ok(result.text)
    }

    async fn note(
      &self
    , cleaned_text: &str
    , template_fields: &Map<String, Value>
    ) -> Result<Note>
    {   if cleaned_text.trim().is_empty()
        {   return Err(Error::InvalidInput("Input text is empty".to_string()));
        }
        let prompt = prompts::note_generator(cleaned_text, template_fields);
        debug!("Prompt length: {} characters", prompt.len());

        let result = self.run(prompt, self.generation.max_tokens_note).await?;
        let secs = result.generation_time_seconds;
        let mut note = parse_output(result)?;
        note.insert("_generation_time".to_string(), json!(format!("{:.2}s", secs)));
        info!("Generated note with {} fields in {:.2}s", note.len(), secs);
        Ok(Note
        {   medical_note: note
          , generation_time_seconds: secs
        })
    }

    async fn template_fields(&self, document_text: &str) -> Result<TemplateFields>
    {   if document_text.trim().chars().count() < MIN_DOCUMENT_CHARS
        {   return Err(Error::InvalidInput(
              "Document text too short to analyze".to_string()
            ));
        }
        let result = self.run(
          prompts::template_extraction(document_text)
        , self.generation.max_tokens_note
        ).await?;
        let fields = parse_output(result)?;
        let field_count = count_fields(&fields);
        info!("Template fields extracted: {}", field_count);
        Ok(TemplateFields
        {   template_name: None
          , fields
          , field_count
        })
    }

    async fn create_template(
      &self
    , document_text: &str
    , template_name: &str
    ) -> Result<TemplateFields>
    {   let name = validate_template_name(template_name)?;
        if self.templates.get_template(&name).await.is_some()
        {   return Err(Error::TemplateExists(name));
        }
        let mut extracted = self.template_fields(document_text).await?;
        self.templates
          .save_template(Template
          {   name: name.clone()
            , fields: extracted.fields.clone()
          })
          .await?;
        info!(
          "Template '{}' created with {} fields",
          name, extracted.field_count
        );
        extracted.template_name = Some(name);
        Ok(extracted)
    }

    async fn run(&self, prompt: String, max_tokens: u32) -> Result<GenerationResult>
    {   let request = GenerationRequest::text(
          prompt
        , self.generation.default_model.clone()
        , max_tokens
        );
        self.orchestrator.generate(&request).await
    }
}

/// Parse model output as a JSON object, keeping the raw text on failure
fn parse_output(result: GenerationResult) -> Result<Map<String, Value>>
{   if result.text.is_empty()
    {   error!("Model returned empty response");
        return Err(Error::EmptyOutput);
    }
    parse_json_object(&result.text).map_err(|source| {
      error!("JSON parse failed: {}", source);
      debug!("Raw output: {}", result.text);
      Error::MalformedOutput
      {   source
        , raw_output: result.text.clone()
        , generation_time_seconds: result.generation_time_seconds
      }
    })
}

fn report<T>(operation: &str, envelope: Envelope<T>) -> Envelope<T>
{   if let Some(e) = &envelope.error
    {   error!("{} failed: {}", operation, e);
    }
    envelope
}
