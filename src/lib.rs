pub mod error;
pub mod config;
pub mod providers;
pub mod request;
pub mod failover;
pub mod extract;
pub mod orchestrator;
pub mod prompts;
pub mod templates;
pub mod transcription;
pub mod client;

/*

medscribe turns a recorded clinical encounter into a structured note:
audio -> transcript -> cleaned text -> template filled by an LLM.
Every model call goes through one orchestrator that retries network
hiccups and falls over to other models when one is rate limited.

medscribe/
├── Cargo.toml
├── src/
│   ├── lib.rs            # Re-exports
│   ├── main.rs           # CLI: builds the client once, runs one operation
│   ├── error.rs          # Error, CallError
│   ├── config.rs         # Config sections, env / JSON loading
│   ├── failover.rs       # ErrorKind classification, RetryPolicy, candidates
│   ├── orchestrator.rs   # Retry / fallback loop
│   ├── extract.rs        # Brace-depth JSON recovery
│   ├── request.rs        # Requests, results, envelopes
│   ├── prompts.rs        # Prompt builders
│   ├── templates.rs      # TemplateStore, in-memory and JSON-file stores
│   ├── transcription.rs  # Audio validation, upload, poll, transcribe
│   ├── client.rs         # ScribeClient: caller-facing operations
│   └── providers/
│       ├── mod.rs        # ModelBackend / FileStore traits
│       └── gemini.rs     # Gemini REST implementation
└── tests/
    └── integration_tests.rs

*/

pub use client::ScribeClient;
pub use config::Config;
pub use error::{CallError, Error, Result};
pub use extract::{extract_json_candidate, parse_json_object, ExtractionError};
pub use failover::{classify_error, CandidateSequence, ErrorKind, RetryPolicy};
pub use orchestrator::{Orchestrator, Sleeper, TokioSleeper};
pub use providers::{FileState, FileStore, GeminiClient, ModelBackend, UploadedFile};
pub use request::{
  Attachment, Contents, Envelope, FailureDetails, GenerationRequest,
  GenerationResult, Note, TemplateFields, Transcription
};
pub use templates::{
  InMemoryTemplateStore, JsonFileTemplateStore, Template, TemplateStore, TemplateSummary
};
