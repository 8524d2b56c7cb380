//! Doctor stage: run the configured checkers over the whole state

use crate::stage::{apply_verification, Stage, VerificationStage};
use crate::types::StageState;
use async_trait::async_trait;
use qdt_common::Result;
use tracing::{info, warn};

/// Expected number of answer options per question
pub const EXPECTED_ANSWERS: usize = 4;

pub struct DoctorStage {
    doctors: Vec<Box<dyn VerificationStage>>,
    workers: usize,
}

impl DoctorStage {
    pub fn new(workers: usize) -> Self {
        Self {
            doctors: Vec::new(),
            workers,
        }
    }

    pub fn with_doctor(mut self, doctor: impl VerificationStage + 'static) -> Self {
        self.doctors.push(Box::new(doctor));
        self
    }

    pub fn doctor_names(&self) -> Vec<&str> {
        self.doctors.iter().map(|d| d.name()).collect()
    }

    /// Shape problems are logged, not stored
    fn check_shapes(state: &StageState) {
        for question in &state.questions {
            if question.answers.len() != EXPECTED_ANSWERS {
                warn!(
                    question_id = question.question_id,
                    test_id = question.test_id,
                    answers = question.answers.len(),
                    "Unexpected number of answers"
                );
            }
            let right = question.right_answers().count();
            if right != 1 {
                warn!(
                    question_id = question.question_id,
                    test_id = question.test_id,
                    right_answers = right,
                    "Question should have exactly one right answer"
                );
            }
        }
    }
}

#[async_trait]
impl Stage for DoctorStage {
    fn name(&self) -> &str {
        "doctor"
    }

    async fn process(&mut self, state: &StageState) -> Result<StageState> {
        Self::check_shapes(state);

        let mut result = state.clone();
        for doctor in &self.doctors {
            result = apply_verification(doctor.as_ref(), &result, self.workers).await?;
        }
        info!(
            doctors = ?self.doctor_names(),
            warnings = result.text_warnings.len(),
            "Doctor finished"
        );
        Ok(result)
    }
}
