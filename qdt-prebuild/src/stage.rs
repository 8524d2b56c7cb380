//! Pipeline stage abstraction
//!
//! A stage receives `&StageState` and returns a new owned state; the input is
//! never mutated. Two shapes cover all stages:
//!
//! - [`DataUpdateStage`]: sequential per-entity rewrite (override, translate,
//!   comment). Driven by [`apply_data_update`].
//! - [`VerificationStage`]: read-only checks producing text warnings, run with
//!   bounded concurrency. Driven by [`apply_verification`].

use crate::types::{PrebuildAnswer, PrebuildQuestion, PrebuildTest, PrebuildTextWarning, StageState};
use async_trait::async_trait;
use futures::future::try_join_all;
use futures::stream::{self, StreamExt, TryStreamExt};
use qdt_common::{Error, Result};
use tracing::{debug, info};

/// One step of the prebuild pipeline
#[async_trait]
pub trait Stage: Send {
    fn name(&self) -> &str;

    /// Called once before `process`
    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn process(&mut self, state: &StageState) -> Result<StageState>;
}

/// Stage that returns an independent copy of its input
#[derive(Debug, Default)]
pub struct PassthroughStage;

#[async_trait]
impl Stage for PassthroughStage {
    fn name(&self) -> &str {
        "passthrough"
    }

    async fn process(&mut self, state: &StageState) -> Result<StageState> {
        Ok(state.clone())
    }
}

/// Per-entity rewrite hooks; every hook defaults to a no-op
#[async_trait]
pub trait DataUpdateStage: Send {
    fn name(&self) -> &str;

    async fn update_test(&mut self, _test: &mut PrebuildTest) -> Result<()> {
        Ok(())
    }

    async fn update_question(&mut self, _question: &mut PrebuildQuestion) -> Result<()> {
        Ok(())
    }

    /// `question` is the question as it was before `update_question` ran
    async fn update_answer(
        &mut self,
        _question: &PrebuildQuestion,
        _answer: &mut PrebuildAnswer,
    ) -> Result<()> {
        Ok(())
    }
}

/// Clone `state` and run the update hooks over it: tests first, then each
/// question followed by its answers.
pub async fn apply_data_update<S>(stage: &mut S, state: &StageState) -> Result<StageState>
where
    S: DataUpdateStage + ?Sized,
{
    let mut result = state.clone();
    let name = stage.name().to_string();

    for test in result.tests.iter_mut() {
        stage
            .update_test(test)
            .await
            .map_err(|e| e.in_stage(&name, format!("test {}", test.test_id)))?;
    }

    for question in result.questions.iter_mut() {
        let snapshot = question.clone();
        stage
            .update_question(question)
            .await
            .map_err(|e| e.in_stage(&name, snapshot.label()))?;

        for answer in question.answers.iter_mut() {
            stage.update_answer(&snapshot, answer).await.map_err(|e| {
                let answer_id = answer
                    .answer_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "new".to_string());
                e.in_stage(&name, format!("answer {} of {}", answer_id, snapshot.label()))
            })?;
        }
        debug!(stage = %name, question_id = snapshot.question_id, "Question updated");
    }

    Ok(result)
}

/// Read-only checks emitting warnings for the codes the stage owns
#[async_trait]
pub trait VerificationStage: Send + Sync {
    fn name(&self) -> &str;

    /// Codes this stage is authoritative for; older warnings with these codes
    /// are replaced by the new findings
    fn warning_codes(&self) -> Vec<&'static str>;

    async fn check_test(&self, _test: &PrebuildTest) -> Result<Vec<PrebuildTextWarning>> {
        Ok(Vec::new())
    }

    async fn check_question(&self, question: &PrebuildQuestion) -> Result<Vec<PrebuildTextWarning>>;

    async fn check_answer(
        &self,
        question: &PrebuildQuestion,
        answer: &PrebuildAnswer,
    ) -> Result<Vec<PrebuildTextWarning>>;
}

/// Run `stage` over every test and question, with up to `workers` questions
/// in flight. Each question's own check and its answer checks run together.
///
/// Output warnings: input warnings with codes the stage does not own, plus
/// the new findings, sorted by `(text_id, text_localization_id, code)`.
pub async fn apply_verification<S>(
    stage: &S,
    state: &StageState,
    workers: usize,
) -> Result<StageState>
where
    S: VerificationStage + ?Sized,
{
    let name = stage.name();
    let mut findings = Vec::new();

    for test in &state.tests {
        let warnings = stage
            .check_test(test)
            .await
            .map_err(|e| e.in_stage(name, format!("test {}", test.test_id)))?;
        findings.extend(warnings);
    }

    let question_futures: Vec<_> = state
        .questions
        .iter()
        .map(move |question| async move {
            let question_check = stage.check_question(question);
            let answer_checks = try_join_all(
                question
                    .answers
                    .iter()
                    .map(|answer| stage.check_answer(question, answer)),
            );
            let (mut warnings, answer_warnings) = futures::try_join!(question_check, answer_checks)
                .map_err(|e| e.in_stage(name, question.label()))?;
            warnings.extend(answer_warnings.into_iter().flatten());
            Ok::<_, Error>(warnings)
        })
        .collect();
    let per_question: Vec<Vec<PrebuildTextWarning>> = stream::iter(question_futures)
        .buffer_unordered(workers.max(1))
        .try_collect()
        .await?;
    findings.extend(per_question.into_iter().flatten());

    let codes = stage.warning_codes();
    let mut text_warnings: Vec<PrebuildTextWarning> = state
        .text_warnings
        .iter()
        .filter(|w| !codes.contains(&w.code.as_str()))
        .cloned()
        .collect();
    let found = findings.len();
    text_warnings.extend(findings);
    text_warnings.sort_by_key(|w| w.sort_key());
    text_warnings.dedup_by(|a, b| a.key() == b.key());

    info!(stage = name, questions = state.questions.len(), found, "Verification complete");

    let mut result = state.clone();
    result.text_warnings = text_warnings;
    Ok(result)
}
