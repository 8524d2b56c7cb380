//! Machine translation of prebuild texts
//!
//! [`Translator`] turns one canonical string into one target language.
//! [`TextTranslator`] decides which slots of a text need translating: only
//! requested languages whose slot is absent or empty are filled, so manual
//! edits and earlier translations are never overwritten.

use crate::llm::{trim_response, LlmService};
use crate::stable_text::is_stable_text;
use crate::types::PrebuildText;
use async_trait::async_trait;
use qdt_common::{Error, Language, Result};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate_question(&self, content: &str, lang: Language) -> Result<String>;

    /// `question_content` is the canonical text of the answer's question
    async fn translate_answer(
        &self,
        content: &str,
        question_content: &str,
        lang: Language,
    ) -> Result<String>;

    async fn translate_question_comment(&self, content: &str, lang: Language) -> Result<String>;
}

/// Returns the canonical content unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughTranslator;

#[async_trait]
impl Translator for PassThroughTranslator {
    async fn translate_question(&self, content: &str, _lang: Language) -> Result<String> {
        Ok(content.to_string())
    }

    async fn translate_answer(
        &self,
        content: &str,
        _question_content: &str,
        _lang: Language,
    ) -> Result<String> {
        Ok(content.to_string())
    }

    async fn translate_question_comment(&self, content: &str, _lang: Language) -> Result<String> {
        Ok(content.to_string())
    }
}

/// Translator prompting a language model, one prompt per text kind
pub struct LlmTranslator<L> {
    llm: L,
    test_type: String,
}

impl<L: LlmService> LlmTranslator<L> {
    pub fn new(llm: L, test_type: impl Into<String>) -> Self {
        Self {
            llm,
            test_type: test_type.into(),
        }
    }

    pub fn llm(&self) -> &L {
        &self.llm
    }

    async fn ask(&self, prompt: String) -> Result<String> {
        let response = self.llm.send_prompt(&prompt, None).await?;
        Ok(trim_response(&response))
    }
}

const REVIEW_INSTRUCTION: &str = "Afterwards reread the translation as a native speaker and smooth out any \
unnatural wording. Reply with the final translation only, no notes.";

#[async_trait]
impl<L: LlmService> Translator for LlmTranslator<L> {
    async fn translate_question(&self, content: &str, lang: Language) -> Result<String> {
        let prompt = format!(
            "Translate this {test_type} question into {lang}. Keep the formal register of a driving \
exam written for a general audience and use standard traffic terminology. Translate literally, \
do not interpret. The question is followed by several answer options.\n```\n{content}\n```\n{review}",
            test_type = self.test_type,
            lang = lang.display_name(),
            content = content,
            review = REVIEW_INSTRUCTION,
        );
        self.ask(prompt).await
    }

    async fn translate_answer(
        &self,
        content: &str,
        question_content: &str,
        lang: Language,
    ) -> Result<String> {
        let prompt = format!(
            "Translate this answer option of a {test_type} question into {lang}:\n```\n{content}\n```\n\
Keep the formal register of a driving exam written for a general audience and use standard traffic \
terminology. Translate literally, do not interpret. For context, the question is:\n```\n{question}\n```\n\
Do not include the question in your reply. {review}",
            test_type = self.test_type,
            lang = lang.display_name(),
            content = content,
            question = question_content,
            review = REVIEW_INSTRUCTION,
        );
        self.ask(prompt).await
    }

    async fn translate_question_comment(&self, content: &str, lang: Language) -> Result<String> {
        let prompt = format!(
            "Translate this explanation of a {test_type} question into {lang}. Keep the formal register \
of a driving exam written for a general audience and use standard traffic terminology. Translate \
literally, do not interpret.\n```\n{content}\n```\n{review}",
            test_type = self.test_type,
            lang = lang.display_name(),
            content = content,
            review = REVIEW_INSTRUCTION,
        );
        self.ask(prompt).await
    }
}

/// What a text is, which selects the translator method
enum TextKind<'a> {
    Title,
    Question,
    Answer { question_content: &'a str },
    Comment,
}

/// Fills missing language slots of texts through a [`Translator`]
pub struct TextTranslator {
    translator: Arc<dyn Translator>,
    languages: Vec<Language>,
}

impl TextTranslator {
    pub fn new(translator: Arc<dyn Translator>, languages: Vec<Language>) -> Self {
        Self {
            translator,
            languages,
        }
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    /// Titles are copied from the canonical slot, never machine translated
    pub async fn translate_title(&self, text: &PrebuildText) -> Result<PrebuildText> {
        self.translate_text(text, TextKind::Title).await
    }

    pub async fn translate_question(&self, text: &PrebuildText) -> Result<PrebuildText> {
        self.translate_text(text, TextKind::Question).await
    }

    pub async fn translate_answer(
        &self,
        question_text: &PrebuildText,
        answer_text: &PrebuildText,
    ) -> Result<PrebuildText> {
        let question_content = canonical_content(question_text)?;
        self.translate_text(answer_text, TextKind::Answer { question_content })
            .await
    }

    pub async fn translate_question_comment(&self, text: &PrebuildText) -> Result<PrebuildText> {
        self.translate_text(text, TextKind::Comment).await
    }

    async fn translate_text(&self, text: &PrebuildText, kind: TextKind<'_>) -> Result<PrebuildText> {
        let canonical = canonical_content(text)?;
        let mut translated = text.clone();
        let stable = is_stable_text(canonical);

        for &lang in &self.languages {
            if lang == Language::CANONICAL {
                continue;
            }
            let missing = translated
                .localizations
                .content(lang)
                .map_or(true, str::is_empty);
            if !missing {
                continue;
            }

            let content = if stable {
                canonical.to_string()
            } else {
                match &kind {
                    TextKind::Title => {
                        PassThroughTranslator.translate_question(canonical, lang).await?
                    }
                    TextKind::Question => self.translator.translate_question(canonical, lang).await?,
                    TextKind::Answer { question_content } => {
                        self.translator
                            .translate_answer(canonical, question_content, lang)
                            .await?
                    }
                    TextKind::Comment => {
                        self.translator
                            .translate_question_comment(canonical, lang)
                            .await?
                    }
                }
            };
            debug!(lang = %lang, text_id = ?text.text_id, stable, "Slot translated");
            translated.localizations.set_content(lang, content);
        }
        Ok(translated)
    }
}

fn canonical_content(text: &PrebuildText) -> Result<&str> {
    match text.canonical_content() {
        Some(content) if !content.is_empty() => Ok(content),
        _ => Err(Error::Invariant(format!(
            "text {:?} has no canonical content",
            text.text_id
        ))),
    }
}
