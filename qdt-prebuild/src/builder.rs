//! Pipeline orchestration
//!
//! Every stage run is load → process → persist against the prebuild store.
//! Persisting diffs the stage output against what was loaded: only changed
//! entities are written, new questions are added, and text warnings are
//! upserted or deleted by `(text_localization_id, code)`.

use crate::db::{BootstrapMode, PrebuildStore};
use crate::overrides::TextOverrides;
use crate::parser::{SourceParser, SourceQuestion};
use crate::stage::Stage;
use crate::stages::{
    ComposeStage, DoctorStage, DumpOverridesStage, OverrideStage, QuestionCommentStage,
    TranslateStage,
};
use crate::types::{
    PrebuildAnswer, PrebuildQuestion, PrebuildTest, PrebuildText, PrebuildTextWarning, StageState,
};
use qdt_common::{Error, Language, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, error, info};

/// Resumable steps after `init`, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStep {
    Override,
    Translate,
    Comment,
    Doctor,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 4] = [
        PipelineStep::Override,
        PipelineStep::Translate,
        PipelineStep::Comment,
        PipelineStep::Doctor,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStep::Override => "override",
            PipelineStep::Translate => "translate",
            PipelineStep::Comment => "comment",
            PipelineStep::Doctor => "doctor",
        }
    }

    /// `self` and every later step
    pub fn remaining(self) -> impl Iterator<Item = PipelineStep> {
        PipelineStep::ALL.into_iter().filter(move |step| *step >= self)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PipelineStep::ALL
            .into_iter()
            .find(|step| step.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::Config(format!("Unknown pipeline step: {}", s)))
    }
}

/// Stages and collaborators needed by [`PrebuildBuilder::run_from`]
pub struct Pipeline {
    pub overrides: TextOverrides,
    pub translate: TranslateStage,
    pub comment: QuestionCommentStage,
    pub doctor: DoctorStage,
}

/// What a persist pass wrote
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PersistSummary {
    pub tests_added: usize,
    pub tests_updated: usize,
    pub questions_added: usize,
    pub questions_updated: usize,
    pub warnings_upserted: usize,
    pub warnings_deleted: usize,
}

pub struct PrebuildBuilder {
    store: PrebuildStore,
    languages: Vec<Language>,
}

impl PrebuildBuilder {
    pub fn new(store: PrebuildStore, languages: Vec<Language>) -> Self {
        Self { store, languages }
    }

    pub fn store(&self) -> &PrebuildStore {
        &self.store
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    pub async fn close(self) {
        self.store.close().await;
    }

    /// Parse the source, compose it and write it into a fresh store
    pub async fn run_init(
        &self,
        parser: &dyn SourceParser,
        compose: &mut ComposeStage,
        mode: BootstrapMode,
    ) -> Result<StageState> {
        if parser.canonical_language() != Language::CANONICAL {
            return Err(Error::Invariant(format!(
                "source language {} is not the canonical language {}",
                parser.canonical_language(),
                Language::CANONICAL
            )));
        }
        let initial = initial_state(parser)?;
        compose.setup().await?;
        let state = compose.process(&initial).await?;

        self.store.bootstrap(mode).await?;
        let mut persisted = StageState::default();
        for test in &state.tests {
            persisted.tests.push(self.store.add_test(test).await?);
        }
        for question in &state.questions {
            persisted.questions.push(self.store.add_question(question).await?);
        }

        info!(
            tests = persisted.tests.len(),
            questions = persisted.questions.len(),
            "Prebuild store initialized at {}",
            self.store.db_path().display()
        );
        Ok(persisted)
    }

    /// Current store contents, with every stored text warning
    pub async fn load_state(&self) -> Result<StageState> {
        Ok(StageState {
            tests: self.store.get_tests().await?,
            questions: self.store.get_questions().await?,
            text_warnings: self.store.get_all_text_warnings().await?,
        })
    }

    /// Write the difference between `before` and `after` to the store
    pub async fn save_state(&self, before: &StageState, after: &StageState) -> Result<PersistSummary> {
        let mut summary = PersistSummary::default();

        let old_tests: HashMap<i64, &PrebuildTest> =
            before.tests.iter().map(|t| (t.test_id, t)).collect();
        for test in &after.tests {
            match old_tests.get(&test.test_id) {
                Some(old) if *old == test => {}
                Some(_) => {
                    self.store.update_test(test).await?;
                    summary.tests_updated += 1;
                }
                None => {
                    self.store.add_test(test).await?;
                    summary.tests_added += 1;
                }
            }
        }

        let old_questions: HashMap<i64, &PrebuildQuestion> =
            before.questions.iter().map(|q| (q.question_id, q)).collect();
        for question in &after.questions {
            match old_questions.get(&question.question_id) {
                Some(old) if *old == question => {}
                Some(_) => {
                    self.store.update_question(question).await?;
                    summary.questions_updated += 1;
                }
                None => {
                    self.store.add_question(question).await?;
                    summary.questions_added += 1;
                }
            }
        }

        let (upserted, deleted) = self.save_warnings(&before.text_warnings, &after.text_warnings).await?;
        summary.warnings_upserted = upserted;
        summary.warnings_deleted = deleted;
        Ok(summary)
    }

    async fn save_warnings(
        &self,
        before: &[PrebuildTextWarning],
        after: &[PrebuildTextWarning],
    ) -> Result<(usize, usize)> {
        let old: HashMap<(i64, &str), &PrebuildTextWarning> = before
            .iter()
            .map(|w| ((w.text_localization_id, w.code.as_str()), w))
            .collect();
        let mut live: HashSet<(i64, &str)> = HashSet::new();
        let mut upserted = 0;
        let mut deleted = 0;

        for warning in after {
            let key = (warning.text_localization_id, warning.code.as_str());
            if warning.content.is_empty() {
                continue;
            }
            live.insert(key);
            match old.get(&key) {
                Some(existing) if existing.content == warning.content => {}
                Some(_) => {
                    // New finding for the same slot needs a fresh review
                    let mut changed = warning.clone();
                    changed.is_manually_checked = false;
                    self.store.add_text_warning(&changed).await?;
                    upserted += 1;
                }
                None => {
                    self.store.add_text_warning(warning).await?;
                    upserted += 1;
                }
            }
        }

        for (key, warning) in &old {
            if !live.contains(key) {
                self.store.delete_text_warning(warning).await?;
                deleted += 1;
            }
        }
        Ok((upserted, deleted))
    }

    /// Load the store, run `stage` and persist its output
    pub async fn run_stage(&self, stage: &mut dyn Stage) -> Result<StageState> {
        let name = stage.name().to_string();
        info!(stage = %name, "Stage started");

        stage.setup().await?;
        let before = self.load_state().await?;
        let after = match stage.process(&before).await {
            Ok(after) => after,
            Err(e) => {
                error!(stage = %name, error = %e, "Stage failed, nothing persisted");
                return Err(e);
            }
        };
        let summary = self.save_state(&before, &after).await?;

        info!(
            stage = %name,
            tests_updated = summary.tests_updated,
            questions_added = summary.questions_added,
            questions_updated = summary.questions_updated,
            warnings_upserted = summary.warnings_upserted,
            warnings_deleted = summary.warnings_deleted,
            "Stage finished"
        );
        Ok(after)
    }

    pub async fn run_compose(&self, compose: &mut ComposeStage) -> Result<StageState> {
        self.run_stage(compose).await
    }

    pub async fn run_override(&self, overrides: &TextOverrides) -> Result<StageState> {
        let mut stage = OverrideStage::new(self.languages.clone(), overrides);
        self.run_stage(&mut stage).await
    }

    /// Record edited slots into `overrides` and save the table
    pub async fn run_dump_overrides(&self, overrides: &mut TextOverrides) -> Result<StageState> {
        let state = {
            let mut stage = DumpOverridesStage::new(self.languages.clone(), overrides);
            self.run_stage(&mut stage).await?
        };
        overrides.save()?;
        Ok(state)
    }

    pub async fn run_translate(&self, stage: &mut TranslateStage) -> Result<StageState> {
        self.run_stage(stage).await
    }

    pub async fn run_question_comment(&self, stage: &mut QuestionCommentStage) -> Result<StageState> {
        self.run_stage(stage).await
    }

    pub async fn run_doctor(&self, stage: &mut DoctorStage) -> Result<StageState> {
        self.run_stage(stage).await
    }

    /// Run `from` and every later step
    pub async fn run_from(&self, from: PipelineStep, pipeline: &mut Pipeline) -> Result<()> {
        for step in from.remaining() {
            debug!(step = %step, "Running pipeline step");
            match step {
                PipelineStep::Override => {
                    self.run_override(&pipeline.overrides).await?;
                }
                PipelineStep::Translate => {
                    self.run_translate(&mut pipeline.translate).await?;
                }
                PipelineStep::Comment => {
                    self.run_question_comment(&mut pipeline.comment).await?;
                }
                PipelineStep::Doctor => {
                    self.run_doctor(&mut pipeline.doctor).await?;
                }
            }
        }
        Ok(())
    }
}

/// Build the unsaved state from the source.
///
/// Ids come from the source when present; otherwise tests are numbered by
/// position and questions by running count.
fn initial_state(parser: &dyn SourceParser) -> Result<StageState> {
    let source_tests = parser.get_tests()?;
    let mut state = StageState::default();

    for (test_index, source_test) in source_tests.into_iter().enumerate() {
        let test_id = source_test.orig_id.unwrap_or(test_index as i64 + 1);
        state.tests.push(PrebuildTest {
            test_id,
            title: PrebuildText::new(source_test.title),
            position: source_test.position,
        });
        for source_question in source_test.questions {
            let question_id = source_question
                .orig_id
                .unwrap_or(state.questions.len() as i64 + 1);
            state
                .questions
                .push(make_question(test_id, question_id, source_question));
        }
    }
    Ok(state)
}

fn make_question(test_id: i64, question_id: i64, source: SourceQuestion) -> PrebuildQuestion {
    PrebuildQuestion {
        test_id,
        question_id,
        text: PrebuildText::new(source.text),
        answers: source
            .answers
            .into_iter()
            .map(|answer| PrebuildAnswer {
                answer_id: answer.orig_id,
                text: PrebuildText::new(answer.text),
                is_right_answer: answer.is_right_answer,
            })
            .collect(),
        image: source.image,
        audio: source.audio,
        comment_text: None,
    }
}
