//! Override stage: write human overrides into question and answer texts

use crate::overrides::{make_answer_context, make_question_context, TextOverrides};
use crate::stage::{apply_data_update, DataUpdateStage, Stage};
use crate::types::{PrebuildAnswer, PrebuildQuestion, PrebuildText, StageState};
use async_trait::async_trait;
use qdt_common::{Error, Language, Result};
use tracing::info;

pub struct OverrideStage<'a> {
    languages: Vec<Language>,
    overrides: &'a TextOverrides,
    matched: usize,
    missed: usize,
}

impl<'a> OverrideStage<'a> {
    pub fn new(languages: Vec<Language>, overrides: &'a TextOverrides) -> Self {
        Self {
            languages,
            overrides,
            matched: 0,
            missed: 0,
        }
    }

    /// Slots replaced during the last run
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Slots without an override during the last run
    pub fn missed(&self) -> usize {
        self.missed
    }

    fn override_text(&mut self, context: &str, text: &mut PrebuildText) -> Result<()> {
        if text.is_manually_checked {
            return Ok(());
        }
        let original = text
            .original
            .clone()
            .ok_or_else(|| Error::Invariant("text has no original content".to_string()))?;

        for &lang in &self.languages {
            match self.overrides.get(context, Language::CANONICAL, &original, lang) {
                Some(content) => {
                    text.localizations.set_content(lang, content);
                    self.matched += 1;
                }
                None => self.missed += 1,
            }
        }
        Ok(())
    }
}

#[async_trait]
impl<'a> DataUpdateStage for OverrideStage<'a> {
    fn name(&self) -> &str {
        "override"
    }

    async fn update_question(&mut self, question: &mut PrebuildQuestion) -> Result<()> {
        let context = make_question_context(question);
        self.override_text(&context, &mut question.text)
    }

    async fn update_answer(
        &mut self,
        question: &PrebuildQuestion,
        answer: &mut PrebuildAnswer,
    ) -> Result<()> {
        let context = make_answer_context(question, answer)?;
        self.override_text(&context, &mut answer.text)
    }
}

#[async_trait]
impl<'a> Stage for OverrideStage<'a> {
    fn name(&self) -> &str {
        "override"
    }

    async fn process(&mut self, state: &StageState) -> Result<StageState> {
        self.matched = 0;
        self.missed = 0;
        let result = apply_data_update(self, state).await?;
        info!(
            matched = self.matched,
            missed = self.missed,
            languages = ?self.languages,
            "Overrides applied"
        );
        Ok(result)
    }
}
