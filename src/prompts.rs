//! Prompt builders. The wording is free to change; callers only rely on
//! getting a single prompt string back.

use serde_json::{Map, Value};

pub fn text_cleaner(transcribed_text: &str) -> String
{   format!(
"You are a medical documentation specialist turning raw speech-to-text output \
into a clean clinical record.

Rules:
- Fix grammar, spelling and punctuation without changing meaning.
- Remove filler words, repetitions, false starts and transcription noise.
- Keep every symptom, medication, dosage, duration, measurement and finding exactly as stated.
- Do not add, infer or interpret anything. If something is unclear, leave it as it is.
- Return only the cleaned text, with no headings or commentary.

### Raw transcription:
{}

### Cleaned text:",
      transcribed_text
    )
}

pub fn note_generator(cleaned_text: &str, template_fields: &Map<String, Value>) -> String
{   let template = serde_json::to_string_pretty(template_fields)
      .unwrap_or_else(|_| Value::Object(template_fields.clone()).to_string());
    format!(
"You are a clinical scribe filling in a structured medical note.

Fill every key of the JSON template below using only information stated in the \
encounter text. Each template value describes what belongs in that field. Keep the \
exact keys and nesting. Use an empty string for anything not mentioned. Do not \
invent findings or diagnoses.

Respond with a single JSON object and nothing else.

### Template:
{}

### Encounter:
{}

### JSON note:",
      template, cleaned_text
    )
}

pub fn template_extraction(document_text: &str) -> String
{   format!(
"You are designing a structured medical note template from an existing clinical \
document.

Identify the sections and fields the document records. Return a JSON object whose \
keys are snake_case field names and whose values are short descriptions of what the \
field holds. Group related fields into nested objects where the document groups them \
(for example vital signs under physical examination).

Respond with a single JSON object and nothing else.

### Document:
{}

### JSON template:",
      document_text
    )
}

pub fn audio_transcription() -> String
{   "Transcribe this clinical encounter recording verbatim. Write out medical terms, \
drug names, doses and numbers exactly as spoken. Do not summarize, translate or add \
speaker commentary. Return only the transcript text."
      .to_string()
}

#[cfg(test)]
mod tests
{   use super::*;
    use serde_json::json;

    #[test]
    fn prompts_embed_their_inputs()
    {   assert!(text_cleaner("um, patient has a cough").contains("um, patient has a cough"));

        let Value::Object(fields) = json!({"chief_complaint": "Main reason for visit"})
        else { unreachable!() };
        let prompt = note_generator("Fever for three days", &fields);
        assert!(prompt.contains("\"chief_complaint\""));
        assert!(prompt.contains("Fever for three days"));

        assert!(template_extraction("HISTORY: ...").contains("HISTORY: ..."));
        assert!(!audio_transcription().is_empty());
    }
}
