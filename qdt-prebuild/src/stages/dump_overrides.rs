//! Dump-overrides stage: record edited slots back into the override table
//!
//! Every non-empty requested-language slot is stored as an override keyed by
//! the canonical original, including slots equal to the original, so dumping
//! into an empty table reproduces what a later override run writes back.
//! The state itself passes through unchanged.

use crate::overrides::{make_answer_context, make_question_context, TextOverrides};
use crate::stage::{apply_data_update, DataUpdateStage, Stage};
use crate::types::{PrebuildAnswer, PrebuildQuestion, PrebuildText, StageState};
use async_trait::async_trait;
use qdt_common::{Error, Language, Result};
use tracing::info;

pub struct DumpOverridesStage<'a> {
    languages: Vec<Language>,
    overrides: &'a mut TextOverrides,
    dumped: usize,
}

impl<'a> DumpOverridesStage<'a> {
    pub fn new(languages: Vec<Language>, overrides: &'a mut TextOverrides) -> Self {
        Self {
            languages,
            overrides,
            dumped: 0,
        }
    }

    pub fn dumped(&self) -> usize {
        self.dumped
    }

    fn dump_text(&mut self, context: &str, text: &PrebuildText) -> Result<()> {
        let original = text
            .original
            .as_deref()
            .ok_or_else(|| Error::Invariant("text has no original content".to_string()))?;

        for &lang in &self.languages {
            let content = match text.localizations.content(lang) {
                Some(content) if !content.is_empty() => content,
                _ => continue,
            };
            self.overrides
                .put(context, Language::CANONICAL, original, lang, content);
            self.dumped += 1;
        }
        Ok(())
    }
}

#[async_trait]
impl<'a> DataUpdateStage for DumpOverridesStage<'a> {
    fn name(&self) -> &str {
        "dump_overrides"
    }

    async fn update_question(&mut self, question: &mut PrebuildQuestion) -> Result<()> {
        let context = make_question_context(question);
        self.dump_text(&context, &question.text)
    }

    async fn update_answer(
        &mut self,
        question: &PrebuildQuestion,
        answer: &mut PrebuildAnswer,
    ) -> Result<()> {
        let context = make_answer_context(question, answer)?;
        self.dump_text(&context, &answer.text)
    }
}

#[async_trait]
impl<'a> Stage for DumpOverridesStage<'a> {
    fn name(&self) -> &str {
        "dump_overrides"
    }

    async fn process(&mut self, state: &StageState) -> Result<StageState> {
        self.dumped = 0;
        let result = apply_data_update(self, state).await?;
        info!(
            dumped = self.dumped,
            total = self.overrides.len(),
            "Overrides dumped"
        );
        Ok(result)
    }
}
