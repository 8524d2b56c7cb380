//! Source datasets
//!
//! A [`SourceParser`] yields the canonical tests that `init` turns into the
//! prebuild store. [`JsonSourceParser`] reads `<data>/tests.json`:
//!
//! ```json
//! [
//!   {
//!     "title": "Road signs",
//!     "position": 1,
//!     "questions": [
//!       {
//!         "text": "What does this sign mean?",
//!         "image": "sign-12.png",
//!         "answers": [
//!           { "text": "Stop", "is_right_answer": true },
//!           { "text": { "EN": "Yield", "FR": "Cédez le passage" } }
//!         ]
//!       }
//!     ]
//!   }
//! ]
//! ```
//!
//! A text is either a plain string in the canonical language or a map of
//! language codes to content.

use qdt_common::{Error, Language, Result, TextLocalizations};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

pub const SOURCE_FILE_NAME: &str = "tests.json";

#[derive(Debug, Clone, PartialEq)]
pub struct SourceAnswer {
    pub text: TextLocalizations,
    pub is_right_answer: bool,
    pub orig_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceQuestion {
    pub text: TextLocalizations,
    pub answers: Vec<SourceAnswer>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub orig_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceTest {
    pub title: TextLocalizations,
    pub questions: Vec<SourceQuestion>,
    pub position: Option<i64>,
    pub orig_id: Option<i64>,
}

pub trait SourceParser: Send + Sync {
    fn get_tests(&self) -> Result<Vec<SourceTest>>;

    fn canonical_language(&self) -> Language {
        Language::CANONICAL
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawText {
    Plain(String),
    Localized(BTreeMap<Language, String>),
}

#[derive(Debug, Deserialize)]
struct RawAnswer {
    text: RawText,
    #[serde(default)]
    is_right_answer: bool,
    #[serde(default)]
    orig_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawQuestion {
    text: RawText,
    #[serde(default)]
    answers: Vec<RawAnswer>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    audio: Option<String>,
    #[serde(default)]
    orig_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct RawTest {
    title: RawText,
    #[serde(default)]
    questions: Vec<RawQuestion>,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    orig_id: Option<i64>,
}

/// Reads tests from a JSON file in the data directory
#[derive(Debug, Clone)]
pub struct JsonSourceParser {
    path: PathBuf,
}

impl JsonSourceParser {
    pub fn new(data_path: &Path) -> Self {
        Self {
            path: data_path.join(SOURCE_FILE_NAME),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse_str(content: &str) -> Result<Vec<SourceTest>> {
        let raw: Vec<RawTest> = serde_json::from_str(content)?;
        raw.into_iter().map(convert_test).collect()
    }
}

impl SourceParser for JsonSourceParser {
    fn get_tests(&self) -> Result<Vec<SourceTest>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::Config(format!("Cannot read source {}: {}", self.path.display(), e))
        })?;
        let tests = Self::parse_str(&content)?;
        info!(
            tests = tests.len(),
            questions = tests.iter().map(|t| t.questions.len()).sum::<usize>(),
            "Source parsed from {}",
            self.path.display()
        );
        Ok(tests)
    }
}

fn convert_text(raw: RawText) -> Result<TextLocalizations> {
    let localizations = match raw {
        RawText::Plain(content) => TextLocalizations::canonical_only(content),
        RawText::Localized(map) => {
            let mut localizations = TextLocalizations::new();
            for (lang, content) in map {
                localizations.set(lang, content, None);
            }
            localizations
        }
    };
    match localizations.content(Language::CANONICAL) {
        Some(content) if !content.is_empty() => Ok(localizations),
        _ => Err(Error::Invariant(
            "source text without canonical content".to_string(),
        )),
    }
}

fn convert_test(raw: RawTest) -> Result<SourceTest> {
    Ok(SourceTest {
        title: convert_text(raw.title)?,
        questions: raw
            .questions
            .into_iter()
            .map(convert_question)
            .collect::<Result<_>>()?,
        position: raw.position,
        orig_id: raw.orig_id,
    })
}

fn convert_question(raw: RawQuestion) -> Result<SourceQuestion> {
    Ok(SourceQuestion {
        text: convert_text(raw.text)?,
        answers: raw
            .answers
            .into_iter()
            .map(|answer| {
                Ok(SourceAnswer {
                    text: convert_text(answer.text)?,
                    is_right_answer: answer.is_right_answer,
                    orig_id: answer.orig_id,
                })
            })
            .collect::<Result<_>>()?,
        image: raw.image,
        audio: raw.audio,
        orig_id: raw.orig_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_plain_and_localized_texts() {
        let tests = JsonSourceParser::parse_str(
            r#"[{"title": "Signs", "orig_id": 7, "questions": [
                {"text": "What?", "image": "a.png", "answers": [
                    {"text": "Stop", "is_right_answer": true},
                    {"text": {"EN": "Go", "FR": "Allez"}}
                ]}
            ]}]"#,
        )
        .unwrap();

        assert_eq!(tests.len(), 1);
        assert_eq!(tests[0].orig_id, Some(7));
        let question = &tests[0].questions[0];
        assert_eq!(question.image.as_deref(), Some("a.png"));
        assert!(question.answers[0].is_right_answer);
        assert!(!question.answers[1].is_right_answer);
        assert_eq!(question.answers[1].text.content(Language::FR), Some("Allez"));
    }

    #[test]
    fn test_missing_canonical_is_rejected() {
        let err = JsonSourceParser::parse_str(r#"[{"title": {"FR": "Signes"}}]"#).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let err = JsonSourceParser::new(temp_dir.path()).get_tests().unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
