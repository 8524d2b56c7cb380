//! Shared fixtures and fakes for qdt-prebuild integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use qdt_common::{Language, Result, TextLocalizations};
use qdt_prebuild::llm::LlmService;
use qdt_prebuild::parser::{SourceAnswer, SourceParser, SourceQuestion, SourceTest};
use qdt_prebuild::translation::Translator;
use qdt_prebuild::{
    BootstrapMode, PrebuildAnswer, PrebuildQuestion, PrebuildStore, PrebuildTest, PrebuildText,
    StoreOptions,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tempfile::TempDir;

/// Fresh store with schema in a temporary directory
pub async fn open_store() -> (TempDir, PrebuildStore) {
    let temp_dir = TempDir::new().unwrap();
    let store = PrebuildStore::open(temp_dir.path(), StoreOptions::default())
        .await
        .unwrap();
    store.bootstrap(BootstrapMode::Recreate).await.unwrap();
    (temp_dir, store)
}

pub fn text(en: &str) -> PrebuildText {
    PrebuildText::new(TextLocalizations::canonical_only(en))
}

pub fn make_test(test_id: i64, title: &str) -> PrebuildTest {
    PrebuildTest {
        test_id,
        title: text(title),
        position: Some(test_id),
    }
}

/// Question whose first answer is the right one
pub fn make_question(test_id: i64, question_id: i64, content: &str, answers: &[&str]) -> PrebuildQuestion {
    PrebuildQuestion {
        test_id,
        question_id,
        text: text(content),
        answers: answers
            .iter()
            .enumerate()
            .map(|(index, answer)| PrebuildAnswer {
                answer_id: None,
                text: text(answer),
                is_right_answer: index == 0,
            })
            .collect(),
        image: None,
        audio: None,
        comment_text: None,
    }
}

pub fn source_question(content: &str, answers: &[&str]) -> SourceQuestion {
    SourceQuestion {
        text: TextLocalizations::canonical_only(content),
        answers: answers
            .iter()
            .enumerate()
            .map(|(index, answer)| SourceAnswer {
                text: TextLocalizations::canonical_only(*answer),
                is_right_answer: index == 0,
                orig_id: None,
            })
            .collect(),
        image: None,
        audio: None,
        orig_id: None,
    }
}

pub fn source_test(title: &str, questions: Vec<SourceQuestion>) -> SourceTest {
    SourceTest {
        title: TextLocalizations::canonical_only(title),
        questions,
        position: None,
        orig_id: None,
    }
}

/// Parser returning a fixed set of tests
pub struct FakeParser {
    pub tests: Vec<SourceTest>,
}

impl SourceParser for FakeParser {
    fn get_tests(&self) -> Result<Vec<SourceTest>> {
        Ok(self.tests.clone())
    }
}

/// Translates to `"<lang>-<content>"`, e.g. `"es-foo"`
#[derive(Default)]
pub struct PrefixTranslator {
    pub calls: AtomicUsize,
}

impl PrefixTranslator {
    fn prefix(&self, content: &str, lang: Language) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-{}", lang.as_str().to_lowercase(), content))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Translator for PrefixTranslator {
    async fn translate_question(&self, content: &str, lang: Language) -> Result<String> {
        self.prefix(content, lang)
    }

    async fn translate_answer(
        &self,
        content: &str,
        _question_content: &str,
        lang: Language,
    ) -> Result<String> {
        self.prefix(content, lang)
    }

    async fn translate_question_comment(&self, content: &str, lang: Language) -> Result<String> {
        self.prefix(content, lang)
    }
}

/// LLM answering every prompt with the same reply, recording prompts
pub struct ScriptedLlm {
    reply: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmService for ScriptedLlm {
    async fn send_prompt(&self, prompt: &str, _image: Option<&Path>) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}
