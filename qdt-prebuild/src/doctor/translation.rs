//! LLM review of translations against the canonical text

use super::common::{canonical_localization, warning_from_response, WC_TRANSLATION};
use crate::llm::LlmService;
use crate::stage::VerificationStage;
use crate::types::{PrebuildAnswer, PrebuildQuestion, PrebuildText, PrebuildTextWarning};
use async_trait::async_trait;
use qdt_common::{Language, Result};
use std::sync::Arc;

pub struct TextTranslationDoctor {
    llm: Arc<dyn LlmService>,
    test_type: String,
}

impl TextTranslationDoctor {
    pub fn new(llm: Arc<dyn LlmService>, test_type: impl Into<String>) -> Self {
        Self {
            llm,
            test_type: test_type.into(),
        }
    }

    pub fn prompt(
        &self,
        text_type: &str,
        context: &str,
        canonical: &str,
        lang: Language,
        translation: &str,
    ) -> String {
        format!(
            "You review translations of {test_type} questions and answers as a bilingual editor.\n\
{context}Is the text\n```\n{translation}\n```\na correct {lang} translation of this {text_type}?\n```\n{canonical}\n```\n\
Judge meaning, not wording. Synonyms, word order and minor style differences are fine. \
Report a problem only when the meaning is wrong, part of the original is missing, something was \
added, or terminology is badly distorted.\n\
If there is a problem, give the corrected translation and say what was wrong.\n\
Otherwise reply with the single word: OK",
            test_type = self.test_type,
            context = context,
            translation = translation,
            lang = lang.display_name(),
            text_type = text_type,
            canonical = canonical,
        )
    }

    /// Review every translated slot that differs from the canonical one
    async fn check_text(
        &self,
        text_type: &str,
        context: &str,
        text: &PrebuildText,
    ) -> Result<Vec<PrebuildTextWarning>> {
        let canonical = canonical_localization(text)?;
        let mut warnings = Vec::new();
        for (lang, translation) in text.localizations.iter() {
            if lang == Language::CANONICAL
                || translation.is_empty()
                || translation.content == canonical.content
            {
                continue;
            }
            let prompt = self.prompt(text_type, context, &canonical.content, lang, &translation.content);
            let response = self.llm.send_prompt(&prompt, None).await?;
            if let Some(warning) = warning_from_response(text, translation, WC_TRANSLATION, &response)? {
                warnings.push(warning);
            }
        }
        Ok(warnings)
    }
}

#[async_trait]
impl VerificationStage for TextTranslationDoctor {
    fn name(&self) -> &str {
        "doctor_translation"
    }

    fn warning_codes(&self) -> Vec<&'static str> {
        vec![WC_TRANSLATION]
    }

    /// Checks the question text and its comment
    async fn check_question(&self, question: &PrebuildQuestion) -> Result<Vec<PrebuildTextWarning>> {
        let mut warnings = self.check_text("question", "", &question.text).await?;
        if let Some(comment) = &question.comment_text {
            if comment.canonical_content().map_or(false, |c| !c.is_empty()) {
                warnings.extend(self.check_text("explanation", "", comment).await?);
            }
        }
        Ok(warnings)
    }

    async fn check_answer(
        &self,
        question: &PrebuildQuestion,
        answer: &PrebuildAnswer,
    ) -> Result<Vec<PrebuildTextWarning>> {
        let context = format!(
            "The answer belongs to the question\n```\n{}\n```\n",
            question.text.canonical_content().unwrap_or_default()
        );
        self.check_text("answer option", &context, &answer.text).await
    }
}
