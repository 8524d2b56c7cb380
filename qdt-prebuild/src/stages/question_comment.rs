//! Question-comment stage: generate a short explanation of the right answer
//!
//! Only questions without a canonical comment get one. The comment is stored
//! in English; the translate stage fills the other languages later.

use crate::llm::{trim_response, LlmService};
use crate::stage::{apply_data_update, DataUpdateStage, Stage};
use crate::types::{PrebuildQuestion, PrebuildText, StageState};
use async_trait::async_trait;
use qdt_common::{Error, Language, Result, TextLocalizations};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds comment prompts and asks the language model
pub struct QuestionCommentService {
    llm: Arc<dyn LlmService>,
    test_type: String,
    images_dir: Option<PathBuf>,
}

impl QuestionCommentService {
    pub fn new(llm: Arc<dyn LlmService>, test_type: impl Into<String>, images_dir: Option<PathBuf>) -> Self {
        Self {
            llm,
            test_type: test_type.into(),
            images_dir,
        }
    }

    pub fn image_path(&self, image: &str) -> PathBuf {
        match &self.images_dir {
            Some(dir) => dir.join(image),
            None => PathBuf::from(image),
        }
    }

    /// Prompt for `question`; fails unless exactly one answer is right
    pub fn build_prompt(&self, question: &PrebuildQuestion) -> Result<String> {
        let question_content = required_content(&question.text, question)?;
        let answers = question
            .answers
            .iter()
            .enumerate()
            .map(|(index, answer)| {
                required_content(&answer.text, question).map(|c| format!("{}. {}", index + 1, c))
            })
            .collect::<Result<Vec<String>>>()?;

        let right: Vec<usize> = question
            .answers
            .iter()
            .enumerate()
            .filter(|(_, answer)| answer.is_right_answer)
            .map(|(index, _)| index)
            .collect();
        let right_index = match right.as_slice() {
            [index] => *index,
            _ => {
                return Err(Error::Invariant(format!(
                    "{} has {} right answers, expected exactly one",
                    question.label(),
                    right.len()
                )))
            }
        };

        let subject = if question.image.is_some() {
            "Using the attached image, briefly explain for the question"
        } else {
            "Briefly explain for the question"
        };

        Ok(format!(
            "You are an examiner for the {test_type}, reviewing questions that check knowledge of traffic rules.\n\
{subject}\n```\n{question}\n```\nwith the answer options\n```\n{answers}\n```\nwhy the right answer is\n```\n{right}\n```\n\
Write formally for a general audience and keep it as short as possible. Do not repeat the answer itself. \
Add a tip that helps remember the right answer, starting the tip with the '💡' symbol.",
            test_type = self.test_type,
            subject = subject,
            question = question_content,
            answers = answers.join("\n"),
            right = answers[right_index],
        ))
    }

    pub async fn get_comment(&self, question: &PrebuildQuestion) -> Result<String> {
        let prompt = self.build_prompt(question)?;
        let image = question.image.as_deref().map(|image| self.image_path(image));
        let response = self.llm.send_prompt(&prompt, image.as_deref()).await?;
        Ok(trim_response(&response))
    }
}

fn required_content<'a>(text: &'a PrebuildText, question: &PrebuildQuestion) -> Result<&'a str> {
    match text.canonical_content() {
        Some(content) if !content.is_empty() => Ok(content),
        _ => Err(Error::Invariant(format!(
            "{} has a text without canonical content",
            question.label()
        ))),
    }
}

pub struct QuestionCommentStage {
    service: QuestionCommentService,
    generated: usize,
}

impl QuestionCommentStage {
    pub fn new(service: QuestionCommentService) -> Self {
        Self {
            service,
            generated: 0,
        }
    }

    pub fn generated(&self) -> usize {
        self.generated
    }
}

#[async_trait]
impl DataUpdateStage for QuestionCommentStage {
    fn name(&self) -> &str {
        "question_comment"
    }

    async fn update_question(&mut self, question: &mut PrebuildQuestion) -> Result<()> {
        let has_comment = question
            .comment_text
            .as_ref()
            .and_then(|c| c.canonical_content())
            .map_or(false, |c| !c.is_empty());
        if has_comment {
            return Ok(());
        }

        let content = self.service.get_comment(question).await?;
        if content.is_empty() {
            debug!(question_id = question.question_id, "Empty comment returned, skipped");
            return Ok(());
        }

        match question.comment_text.as_mut() {
            Some(comment) => {
                comment.localizations.set_content(Language::CANONICAL, content.clone());
                if comment.original.is_none() {
                    comment.original = Some(content);
                }
            }
            None => {
                question.comment_text =
                    Some(PrebuildText::new(TextLocalizations::canonical_only(content)));
            }
        }
        self.generated += 1;
        Ok(())
    }
}

#[async_trait]
impl Stage for QuestionCommentStage {
    fn name(&self) -> &str {
        "question_comment"
    }

    async fn process(&mut self, state: &StageState) -> Result<StageState> {
        self.generated = 0;
        let result = apply_data_update(self, state).await?;
        info!(generated = self.generated, "Question comments generated");
        Ok(result)
    }
}
