//! Prebuild entities carried between pipeline stages
//!
//! Identities (`text_id`, `localization_id`, `answer_id`, ...) are assigned by
//! the store. Entities built from a source parse carry `None` until persisted.

use qdt_common::{Language, TextLocalizations};

/// A translatable text with all its language slots
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrebuildText {
    pub localizations: TextLocalizations,
    pub text_id: Option<i64>,
    /// Canonical content snapshot taken at ingestion, never mutated afterwards
    pub original: Option<String>,
    pub is_manually_checked: bool,
    pub last_update_timestamp: Option<i64>,
    /// Populated only by `PrebuildStore::get_questions_by_test`
    pub warnings: Vec<PrebuildTextWarning>,
}

impl PrebuildText {
    /// New text whose `original` is the canonical slot of `localizations`
    pub fn new(localizations: TextLocalizations) -> Self {
        let original = localizations
            .content(Language::CANONICAL)
            .map(str::to_string);
        Self {
            localizations,
            original,
            ..Default::default()
        }
    }

    pub fn canonical_content(&self) -> Option<&str> {
        self.localizations.content(Language::CANONICAL)
    }

    /// Copy of this text with every persisted identity removed
    pub fn without_ids(&self) -> PrebuildText {
        PrebuildText {
            localizations: self.localizations.without_ids(),
            text_id: None,
            original: self.original.clone(),
            is_manually_checked: self.is_manually_checked,
            last_update_timestamp: None,
            warnings: Vec::new(),
        }
    }
}

/// A doctor finding attached to one localization of a text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrebuildTextWarning {
    pub text_warning_id: Option<i64>,
    pub text_id: i64,
    pub text_localization_id: i64,
    pub code: String,
    /// Empty content means the warning is resolved
    pub content: String,
    pub is_manually_checked: bool,
    pub last_update_timestamp: Option<i64>,
}

impl PrebuildTextWarning {
    pub fn new(
        text_id: i64,
        text_localization_id: i64,
        code: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            text_warning_id: None,
            text_id,
            text_localization_id,
            code: code.into(),
            content: content.into(),
            is_manually_checked: false,
            last_update_timestamp: None,
        }
    }

    /// Uniqueness key of a live warning
    pub fn key(&self) -> (i64, String) {
        (self.text_localization_id, self.code.clone())
    }

    /// Deterministic ordering key used when merging findings
    pub fn sort_key(&self) -> (i64, i64, String) {
        (self.text_id, self.text_localization_id, self.code.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrebuildAnswer {
    pub answer_id: Option<i64>,
    pub text: PrebuildText,
    pub is_right_answer: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrebuildQuestion {
    pub test_id: i64,
    pub question_id: i64,
    pub text: PrebuildText,
    pub answers: Vec<PrebuildAnswer>,
    pub image: Option<String>,
    pub audio: Option<String>,
    pub comment_text: Option<PrebuildText>,
}

impl PrebuildQuestion {
    /// Identity used in logs and stage errors
    pub fn label(&self) -> String {
        format!("question {} (test {})", self.question_id, self.test_id)
    }

    pub fn right_answers(&self) -> impl Iterator<Item = &PrebuildAnswer> {
        self.answers.iter().filter(|a| a.is_right_answer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrebuildTest {
    pub test_id: i64,
    pub title: PrebuildText,
    pub position: Option<i64>,
}

/// Snapshot passed between stages
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageState {
    pub tests: Vec<PrebuildTest>,
    pub questions: Vec<PrebuildQuestion>,
    pub text_warnings: Vec<PrebuildTextWarning>,
}
