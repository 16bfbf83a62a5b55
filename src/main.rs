//! medscribe command line.
//!
//! Builds one [`ScribeClient`] from configuration and runs a single
//! operation, printing the resulting envelope as JSON.
//!
//! ```bash
//! medscribe transcribe-and-clean visit.m4a
//! medscribe note --template general_soap_note cleaned.txt
//! medscribe --templates templates.json template --name "Cardiology consult" form.txt
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::error;
use serde::Serialize;
use serde_json::{Map, Value};

use medscribe::{
  Config, Envelope, InMemoryTemplateStore, JsonFileTemplateStore, ScribeClient,
  TemplateStore
};

#[derive(Parser, Debug)]
#[command(name = "medscribe")]
#[command(about = "Generate structured clinical notes from recorded encounters")]
struct Args
{   /// JSON configuration file; environment variables are used otherwise
    #[arg(long, env = "MEDSCRIBE_CONFIG")]
    config: Option<PathBuf>

  , /// JSON file holding stored templates; without it templates created
    /// by `template --name` last only for this run
    #[arg(long, env = "MEDSCRIBE_TEMPLATES")]
    templates: Option<PathBuf>

  , #[command(subcommand)]
    command: Command
}

#[derive(Subcommand, Debug)]
enum Command
{   /// Clean a raw transcript read from a text file
    Clean
    {   input: PathBuf
    }
  , /// Fill a template from cleaned encounter text
    Note
    {   input: PathBuf
      , /// Name of a stored template
        #[arg(long, default_value = "general_soap_note", conflicts_with = "template_file")]
        template: String
      , /// JSON file holding the template fields instead
        #[arg(long)]
        template_file: Option<PathBuf>
    }
  , /// Derive template fields from document text; stores them when --name
    /// is given (persisted only with --templates)
    Template
    {   input: PathBuf
      , #[arg(long)]
        name: Option<String>
    }
  , /// Transcribe an audio file
    Transcribe
    {   audio: PathBuf
    }
  , /// Transcribe an audio file and clean the transcript
    TranscribeAndClean
    {   audio: PathBuf
    }
  , /// List stored templates
    Templates
}

#[tokio::main]
async fn main() -> ExitCode
{   env_logger::Builder::from_env(
      env_logger::Env::default().default_filter_or("info")
    ).init();

    let args = Args::parse();
    match run(args).await
    {   Ok(true) => ExitCode::SUCCESS
      , Ok(false) => ExitCode::FAILURE
      , Err(e) => {
          error!("{}", e);
          ExitCode::FAILURE
        }
    }
}

/// Returns whether the operation succeeded
async fn run(args: Args) -> medscribe::Result<bool>
{   let config = match &args.config
    {   Some(path) => Config::from_json_file(path)?
      , None => Config::from_env()?
    };
    let templates: Arc<dyn TemplateStore> = match &args.templates
    {   Some(path) => Arc::new(JsonFileTemplateStore::open(path).await?)
      , None => Arc::new(InMemoryTemplateStore::with_defaults())
    };
    let client = ScribeClient::from_gemini_with_templates(&config, templates)?;

    match args.command
    {   Command::Clean { input } => {
          let text = read_text(&input).await?;
          emit(&client.clean(&text).await)
        }
      , Command::Note { input, template, template_file } => {
          let text = read_text(&input).await?;
          let envelope = match template_file
          {   Some(path) => {
                let fields: Map<String, Value>
                  = serde_json::from_str(&read_text(&path).await?)?;
                client.generate_note(&text, &fields).await
              }
            , None => client.generate_note_from_template(&text, &template).await
          };
          emit(&envelope)
        }
      , Command::Template { input, name } => {
          let text = read_text(&input).await?;
          let envelope = match name
          {   Some(name) => client.create_template_from_document(&text, &name).await
            , None => client.extract_template_fields(&text).await
          };
          emit(&envelope)
        }
      , Command::Transcribe { audio } => emit(&client.transcribe(&audio).await)
      , Command::TranscribeAndClean { audio } => {
          emit(&client.transcribe_and_clean(&audio).await)
        }
      , Command::Templates => {
          let listed = client.templates().list_templates().await;
          emit(&Envelope::ok(listed, 0.0))
        }
    }
}

async fn read_text(path: &Path) -> medscribe::Result<String>
{   Ok(tokio::fs::read_to_string(path).await?)
}

fn emit<T: Serialize>(envelope: &Envelope<T>) -> medscribe::Result<bool>
{   println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(envelope.success)
}
