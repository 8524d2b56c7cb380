//! Compose stage: top up tests that have fewer questions than required
//!
//! Missing slots are filled with copies of questions drawn from the whole
//! input set. A copy is identified by the `(test_id, question_id)` of its
//! source so a test never receives the same source question twice.

use crate::stage::Stage;
use crate::types::{PrebuildAnswer, PrebuildQuestion, PrebuildTest, StageState};
use async_trait::async_trait;
use qdt_common::{Error, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeMode {
    /// Leave tests as they are
    Skip,
    /// Fill tests up to `questions_per_test`
    FixMissed,
}

impl FromStr for ComposeMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ComposeMode::Skip),
            "fix_missed" => Ok(ComposeMode::FixMissed),
            other => Err(Error::Config(format!("Unknown compose mode: {}", other))),
        }
    }
}

pub struct ComposeStage {
    mode: ComposeMode,
    questions_per_test: usize,
    rng: StdRng,
}

impl ComposeStage {
    /// `random_seed` makes sampling reproducible; entropy is used otherwise
    pub fn new(mode: ComposeMode, questions_per_test: usize, random_seed: Option<u64>) -> Self {
        let rng = match random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            mode,
            questions_per_test,
            rng,
        }
    }
}

#[async_trait]
impl Stage for ComposeStage {
    fn name(&self) -> &str {
        "compose"
    }

    async fn process(&mut self, state: &StageState) -> Result<StageState> {
        let mut result = state.clone();
        if self.mode == ComposeMode::FixMissed {
            result.questions = fill_tests(
                &state.tests,
                &state.questions,
                self.questions_per_test,
                &mut self.rng,
            )?;
            info!(
                before = state.questions.len(),
                after = result.questions.len(),
                questions_per_test = self.questions_per_test,
                "Tests composed"
            );
        }
        Ok(result)
    }
}

type Signature = (i64, i64);

fn signature(question: &PrebuildQuestion) -> Signature {
    (question.test_id, question.question_id)
}

/// Copy of `source` that persists as a new entity in `test_id`
fn clone_into_test(source: &PrebuildQuestion, test_id: i64, question_id: i64) -> PrebuildQuestion {
    PrebuildQuestion {
        test_id,
        question_id,
        text: source.text.without_ids(),
        answers: source
            .answers
            .iter()
            .map(|answer| PrebuildAnswer {
                answer_id: None,
                text: answer.text.without_ids(),
                is_right_answer: answer.is_right_answer,
            })
            .collect(),
        image: source.image.clone(),
        audio: source.audio.clone(),
        comment_text: source.comment_text.as_ref().map(|c| c.without_ids()),
    }
}

/// Fill every test up to `questions_per_test` from the shared pool.
///
/// Output is grouped by test in test order, original questions first.
/// New question ids continue after the largest existing id.
pub fn fill_tests<R: Rng>(
    tests: &[PrebuildTest],
    questions: &[PrebuildQuestion],
    questions_per_test: usize,
    rng: &mut R,
) -> Result<Vec<PrebuildQuestion>> {
    let test_index: HashMap<i64, usize> = tests
        .iter()
        .enumerate()
        .map(|(index, test)| (test.test_id, index))
        .collect();

    let mut buckets: Vec<Vec<PrebuildQuestion>> = vec![Vec::new(); tests.len()];
    let mut signatures: Vec<HashSet<Signature>> = vec![HashSet::new(); tests.len()];
    for question in questions {
        let index = *test_index.get(&question.test_id).ok_or_else(|| {
            Error::Invariant(format!(
                "{} references unknown test {}",
                question.label(),
                question.test_id
            ))
        })?;
        buckets[index].push(question.clone());
        signatures[index].insert(signature(question));
    }

    let mut next_question_id = questions.iter().map(|q| q.question_id).max().unwrap_or(0) + 1;
    let mut pool: Vec<&PrebuildQuestion> = questions.iter().collect();

    for (index, test) in tests.iter().enumerate() {
        let bucket = &mut buckets[index];
        let test_signatures = &mut signatures[index];
        if bucket.len() > questions_per_test {
            return Err(Error::Invariant(format!(
                "test {} has {} questions, expected at most {}",
                test.test_id,
                bucket.len(),
                questions_per_test
            )));
        }

        // Consumed candidates are swapped past pool_end; the order carries over between tests
        let mut pool_end = pool.len();
        while bucket.len() < questions_per_test && pool_end > 0 {
            let candidate_index = rng.gen_range(0..pool_end);
            let candidate = pool[candidate_index];
            let candidate_signature = signature(candidate);
            if !test_signatures.contains(&candidate_signature) {
                bucket.push(clone_into_test(candidate, test.test_id, next_question_id));
                next_question_id += 1;
                test_signatures.insert(candidate_signature);
            }
            pool_end -= 1;
            pool.swap(candidate_index, pool_end);
        }
    }

    Ok(buckets.into_iter().flatten().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrebuildText;
    use proptest::prelude::*;
    use qdt_common::TextLocalizations;

    fn make_test(test_id: i64) -> PrebuildTest {
        PrebuildTest {
            test_id,
            title: PrebuildText::new(TextLocalizations::canonical_only(format!("Test {}", test_id))),
            position: None,
        }
    }

    fn make_question(test_id: i64, question_id: i64) -> PrebuildQuestion {
        let mut text = PrebuildText::new(TextLocalizations::canonical_only(format!("q{}", question_id)));
        text.text_id = Some(question_id * 100);
        PrebuildQuestion {
            test_id,
            question_id,
            text,
            answers: vec![PrebuildAnswer {
                answer_id: Some(question_id * 10),
                text: PrebuildText::new(TextLocalizations::canonical_only("yes")),
                is_right_answer: true,
            }],
            image: None,
            audio: None,
            comment_text: None,
        }
    }

    #[test]
    fn test_parse_mode() {
        assert_eq!("SKIP".parse::<ComposeMode>().unwrap(), ComposeMode::Skip);
        assert_eq!("fix_missed".parse::<ComposeMode>().unwrap(), ComposeMode::FixMissed);
        assert!("shuffle".parse::<ComposeMode>().is_err());
    }

    #[test]
    fn test_too_many_questions_is_error() {
        let tests = vec![make_test(1)];
        let questions = vec![make_question(1, 1), make_question(1, 2)];
        let mut rng = StdRng::seed_from_u64(1);
        let err = fill_tests(&tests, &questions, 1, &mut rng).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn test_unknown_test_is_error() {
        let tests = vec![make_test(1)];
        let questions = vec![make_question(2, 1)];
        let mut rng = StdRng::seed_from_u64(1);
        assert!(fill_tests(&tests, &questions, 3, &mut rng).is_err());
    }

    #[test]
    fn test_clones_get_fresh_ids() {
        let tests = vec![make_test(1), make_test(2)];
        let questions = vec![make_question(1, 7), make_question(2, 3)];
        let mut rng = StdRng::seed_from_u64(3);

        let result = fill_tests(&tests, &questions, 2, &mut rng).unwrap();

        let ids: Vec<(i64, i64)> = result.iter().map(|q| (q.test_id, q.question_id)).collect();
        assert_eq!(ids, vec![(1, 7), (1, 8), (2, 3), (2, 9)]);
        let clone = &result[1];
        assert_eq!(clone.text.canonical_content(), Some("q3"));
        assert_eq!(clone.text.text_id, None);
        assert_eq!(clone.answers[0].answer_id, None);
    }

    proptest! {
        #[test]
        fn prop_tests_filled_to_bound(
            counts in proptest::collection::vec(0usize..5, 1..5),
            per_test in 1usize..8,
            seed in any::<u64>(),
        ) {
            let tests: Vec<PrebuildTest> = (1..=counts.len() as i64).map(make_test).collect();
            let mut questions = Vec::new();
            let mut question_id = 0;
            for (index, count) in counts.iter().enumerate() {
                for _ in 0..(*count).min(per_test) {
                    question_id += 1;
                    questions.push(make_question(index as i64 + 1, question_id));
                }
            }
            let total = questions.len();
            let mut rng = StdRng::seed_from_u64(seed);

            let result = fill_tests(&tests, &questions, per_test, &mut rng).unwrap();

            for test in &tests {
                let in_test: Vec<&PrebuildQuestion> =
                    result.iter().filter(|q| q.test_id == test.test_id).collect();
                prop_assert_eq!(in_test.len(), per_test.min(total));
                let texts: HashSet<&str> =
                    in_test.iter().filter_map(|q| q.text.canonical_content()).collect();
                prop_assert_eq!(texts.len(), in_test.len());
            }
            let ids: HashSet<i64> = result.iter().map(|q| q.question_id).collect();
            prop_assert_eq!(ids.len(), result.len());
        }
    }
}
