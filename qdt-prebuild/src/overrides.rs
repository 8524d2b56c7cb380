//! Human text overrides
//!
//! An override replaces the machine (or source) content of one language slot.
//! It is keyed by `(context, source_lang, source_text, dest_lang)` where
//! `source_text` is the canonical original of the text and `context`
//! disambiguates identical texts (answers carry their question).
//!
//! The table lives in `<data>/overrides.csv` and is loaded and saved wholesale.

use crate::types::{PrebuildAnswer, PrebuildQuestion};
use qdt_common::{Error, Language, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Column order of the overrides file
pub const OVERRIDES_HEADER: [&str; 5] = ["context", "source_lang", "source_text", "dest_lang", "dest_text"];

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct OverrideKey {
    pub context: String,
    pub source_lang: Language,
    pub source_text: String,
    pub dest_lang: Language,
}

#[derive(Debug, Serialize, Deserialize)]
struct OverrideRecord {
    context: String,
    source_lang: String,
    source_text: String,
    dest_lang: String,
    dest_text: String,
}

/// Questions share one context
pub fn make_question_context(_question: &PrebuildQuestion) -> String {
    String::new()
}

/// Answers are scoped to their question's original text and correctness
pub fn make_answer_context(question: &PrebuildQuestion, answer: &PrebuildAnswer) -> Result<String> {
    let question_original = question.text.original.as_deref().ok_or_else(|| {
        Error::Invariant(format!("{} has no original text", question.label()))
    })?;
    // Capitalized booleans keep existing override files valid
    let is_right_answer = if answer.is_right_answer { "True" } else { "False" };
    Ok(format!(
        "question: {}; is_right_answer: {}",
        question_original, is_right_answer
    ))
}

/// In-memory override table bound to its file
#[derive(Debug, Clone)]
pub struct TextOverrides {
    path: PathBuf,
    entries: BTreeMap<OverrideKey, String>,
}

impl TextOverrides {
    /// Empty table that will be saved to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Load the table from `path`; a missing file yields an empty table
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let mut overrides = Self::new(path);
        if !overrides.path.exists() {
            info!("No overrides file at {}, starting empty", overrides.path.display());
            return Ok(overrides);
        }

        let mut reader = csv::Reader::from_path(&overrides.path).map_err(std::io::Error::from)?;
        let header = reader.headers().map_err(std::io::Error::from)?;
        if header.iter().ne(OVERRIDES_HEADER.iter().copied()) {
            return Err(Error::Invariant(format!(
                "Unexpected header in {}: {:?}",
                overrides.path.display(),
                header
            )));
        }

        for record in reader.deserialize::<OverrideRecord>() {
            let record = record.map_err(std::io::Error::from)?;
            let key = OverrideKey {
                context: record.context,
                source_lang: parse_language(&record.source_lang, &overrides.path)?,
                source_text: record.source_text,
                dest_lang: parse_language(&record.dest_lang, &overrides.path)?,
            };
            overrides.entries.insert(key, record.dest_text);
        }

        info!(
            records = overrides.entries.len(),
            "Overrides loaded from {}",
            overrides.path.display()
        );
        Ok(overrides)
    }

    /// Write the whole table, rows sorted by key, through a temporary file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let temp_path = PathBuf::from(format!("{}.temp", self.path.display()));

        {
            let mut writer = csv::WriterBuilder::new()
                .quote_style(csv::QuoteStyle::Always)
                .has_headers(true)
                .from_path(&temp_path)
                .map_err(std::io::Error::from)?;
            for (key, dest_text) in &self.entries {
                writer
                    .serialize(OverrideRecord {
                        context: key.context.clone(),
                        source_lang: key.source_lang.as_str().to_string(),
                        source_text: key.source_text.clone(),
                        dest_lang: key.dest_lang.as_str().to_string(),
                        dest_text: dest_text.clone(),
                    })
                    .map_err(std::io::Error::from)?;
            }
            writer.flush()?;
        }
        std::fs::rename(&temp_path, &self.path)?;

        info!(records = self.entries.len(), "Overrides saved to {}", self.path.display());
        Ok(())
    }

    pub fn get(
        &self,
        context: &str,
        source_lang: Language,
        source_text: &str,
        dest_lang: Language,
    ) -> Option<&str> {
        let key = OverrideKey {
            context: context.to_string(),
            source_lang,
            source_text: source_text.to_string(),
            dest_lang,
        };
        self.entries.get(&key).map(String::as_str)
    }

    pub fn put(
        &mut self,
        context: &str,
        source_lang: Language,
        source_text: &str,
        dest_lang: Language,
        dest_text: impl Into<String>,
    ) {
        let key = OverrideKey {
            context: context.to_string(),
            source_lang,
            source_text: source_text.to_string(),
            dest_lang,
        };
        self.entries.insert(key, dest_text.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OverrideKey, &str)> {
        self.entries.iter().map(|(key, value)| (key, value.as_str()))
    }
}

fn parse_language(name: &str, path: &Path) -> Result<Language> {
    Language::from_name(name).ok_or_else(|| {
        Error::Invariant(format!("Unknown language '{}' in {}", name, path.display()))
    })
}
