//! LLM review of canonical (English) texts

use super::common::{canonical_localization, warning_from_response, WC_CANONICAL_NO_ORIG};
use crate::llm::LlmService;
use crate::stage::VerificationStage;
use crate::types::{PrebuildAnswer, PrebuildQuestion, PrebuildTextWarning};
use async_trait::async_trait;
use qdt_common::Result;
use std::path::PathBuf;
use std::sync::Arc;

pub struct TextCanonicalDoctor {
    llm: Arc<dyn LlmService>,
    test_type: String,
    images_dir: Option<PathBuf>,
}

impl TextCanonicalDoctor {
    pub fn new(llm: Arc<dyn LlmService>, test_type: impl Into<String>, images_dir: Option<PathBuf>) -> Self {
        Self {
            llm,
            test_type: test_type.into(),
            images_dir,
        }
    }

    fn image_path(&self, question: &PrebuildQuestion) -> Option<PathBuf> {
        let image = question.image.as_deref()?;
        Some(match &self.images_dir {
            Some(dir) => dir.join(image),
            None => PathBuf::from(image),
        })
    }

    fn answers_listing(question: &PrebuildQuestion) -> String {
        question
            .answers
            .iter()
            .enumerate()
            .map(|(index, answer)| {
                format!("{}. {}", index + 1, answer.text.canonical_content().unwrap_or_default())
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn image_note(question: &PrebuildQuestion) -> &'static str {
        if question.image.is_some() {
            "An image is attached to the question."
        } else {
            "No image is attached to the question."
        }
    }

    pub fn question_prompt(&self, question: &PrebuildQuestion, content: &str) -> String {
        format!(
            "Review this {test_type} question. {image_note}\n```\n{content}\n```\n\
The answer options are:\n```\n{answers}\n```\n\
Look only at the question itself, not at the answers. If it has typos, grammar mistakes or \
logical errors, give the corrected question and say what was wrong.\n\
If it is correct, reply with the single word: OK",
            test_type = self.test_type,
            image_note = Self::image_note(question),
            content = content,
            answers = Self::answers_listing(question),
        )
    }

    pub fn answer_prompt(&self, question: &PrebuildQuestion, content: &str) -> String {
        format!(
            "Review this answer option of a {test_type} question. {image_note}\n```\n{content}\n```\n\
The question is:\n```\n{question}\n```\n\
If the answer option has typos, grammar mistakes or logical errors, give the corrected option \
and say what was wrong. Do not judge whether the option is right or wrong.\n\
If it is correct, reply with the single word: OK",
            test_type = self.test_type,
            image_note = Self::image_note(question),
            content = content,
            question = question.text.canonical_content().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl VerificationStage for TextCanonicalDoctor {
    fn name(&self) -> &str {
        "doctor_canonical"
    }

    fn warning_codes(&self) -> Vec<&'static str> {
        vec![WC_CANONICAL_NO_ORIG]
    }

    async fn check_question(&self, question: &PrebuildQuestion) -> Result<Vec<PrebuildTextWarning>> {
        let canonical = canonical_localization(&question.text)?;
        let prompt = self.question_prompt(question, &canonical.content);
        let image = self.image_path(question);
        let response = self.llm.send_prompt(&prompt, image.as_deref()).await?;
        Ok(warning_from_response(&question.text, canonical, WC_CANONICAL_NO_ORIG, &response)?
            .into_iter()
            .collect())
    }

    async fn check_answer(
        &self,
        question: &PrebuildQuestion,
        answer: &PrebuildAnswer,
    ) -> Result<Vec<PrebuildTextWarning>> {
        let canonical = canonical_localization(&answer.text)?;
        let prompt = self.answer_prompt(question, &canonical.content);
        let image = self.image_path(question);
        let response = self.llm.send_prompt(&prompt, image.as_deref()).await?;
        Ok(warning_from_response(&answer.text, canonical, WC_CANONICAL_NO_ORIG, &response)?
            .into_iter()
            .collect())
    }
}
