//! Translate stage: fill missing language slots of every text

use crate::stage::{apply_data_update, DataUpdateStage, Stage};
use crate::translation::TextTranslator;
use crate::types::{PrebuildAnswer, PrebuildQuestion, PrebuildTest, PrebuildText, StageState};
use async_trait::async_trait;
use qdt_common::Result;
use tracing::info;

pub struct TranslateStage {
    translator: TextTranslator,
    updated_texts: usize,
}

impl TranslateStage {
    pub fn new(translator: TextTranslator) -> Self {
        Self {
            translator,
            updated_texts: 0,
        }
    }

    /// Texts that received at least one new slot during the last run
    pub fn updated_texts(&self) -> usize {
        self.updated_texts
    }

    fn track(&mut self, before: &PrebuildText, after: &PrebuildText) {
        if before.localizations != after.localizations {
            self.updated_texts += 1;
        }
    }
}

#[async_trait]
impl DataUpdateStage for TranslateStage {
    fn name(&self) -> &str {
        "translate"
    }

    async fn update_test(&mut self, test: &mut PrebuildTest) -> Result<()> {
        let title = self.translator.translate_title(&test.title).await?;
        self.track(&test.title, &title);
        test.title = title;
        Ok(())
    }

    async fn update_question(&mut self, question: &mut PrebuildQuestion) -> Result<()> {
        let text = self.translator.translate_question(&question.text).await?;
        self.track(&question.text, &text);
        question.text = text;

        if let Some(comment) = &question.comment_text {
            let translated = self.translator.translate_question_comment(comment).await?;
            self.track(comment, &translated);
            question.comment_text = Some(translated);
        }
        Ok(())
    }

    async fn update_answer(
        &mut self,
        question: &PrebuildQuestion,
        answer: &mut PrebuildAnswer,
    ) -> Result<()> {
        let text = self
            .translator
            .translate_answer(&question.text, &answer.text)
            .await?;
        self.track(&answer.text, &text);
        answer.text = text;
        Ok(())
    }
}

#[async_trait]
impl Stage for TranslateStage {
    fn name(&self) -> &str {
        "translate"
    }

    async fn process(&mut self, state: &StageState) -> Result<StageState> {
        self.updated_texts = 0;
        let result = apply_data_update(self, state).await?;
        info!(
            updated_texts = self.updated_texts,
            languages = ?self.translator.languages(),
            "Translation complete"
        );
        Ok(result)
    }
}
