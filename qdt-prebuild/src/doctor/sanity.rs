//! Local sanity checks, no external calls

use super::common::{make_warning, WC_SANITY_BROKEN_NUMBERS, WC_SANITY_FORBIDDEN_SYMBOL};
use crate::stage::VerificationStage;
use crate::types::{PrebuildAnswer, PrebuildQuestion, PrebuildText, PrebuildTextWarning};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use qdt_common::{Error, Language, Result};
use regex::Regex;

static FORBIDDEN_SYMBOL_QUESTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\n\t`«»]").expect("Invalid question symbol regex"));
static FORBIDDEN_SYMBOL_ANSWER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\n\t`«»?]").expect("Invalid answer symbol regex"));
/// Plain integers or comma-grouped thousands (`1,000`), in any script's digits
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{1,3}(?:,\d{3})+\b|\b\d+\b").expect("Invalid number regex")
});
static DIGIT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d$").expect("Invalid digit regex"));

fn is_decimal_digit(c: char) -> bool {
    let mut buf = [0u8; 4];
    DIGIT_RE.is_match(c.encode_utf8(&mut buf))
}

/// Value of a decimal digit from any script (`'۵'` is 5).
///
/// Unicode decimal digits come in contiguous runs starting at zero, so the
/// value is the offset from the start of the run.
fn digit_value(c: char) -> Option<u32> {
    if let Some(value) = c.to_digit(10) {
        return Some(value);
    }
    if !is_decimal_digit(c) {
        return None;
    }
    let mut start = c as u32;
    while let Some(prev) = start.checked_sub(1).and_then(char::from_u32) {
        if !is_decimal_digit(prev) {
            break;
        }
        start -= 1;
    }
    Some((c as u32 - start) % 10)
}

fn parse_number(found: &str) -> Option<u64> {
    found
        .chars()
        .filter(|c| *c != ',')
        .try_fold(0u64, |acc, c| {
            let digit = digit_value(c)?;
            acc.checked_mul(10)?.checked_add(u64::from(digit))
        })
}

/// Sorted numbers found in `content`
pub fn extract_numbers(content: &str) -> Vec<u64> {
    let mut numbers: Vec<u64> = NUMBER_RE
        .find_iter(content)
        .filter_map(|m| parse_number(m.as_str()))
        .collect();
    numbers.sort_unstable();
    numbers
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TextSanityDoctor;

impl TextSanityDoctor {
    pub fn new() -> Self {
        Self
    }

    fn check_text(&self, text: &PrebuildText, forbidden: &Regex) -> Result<Vec<PrebuildTextWarning>> {
        let mut warnings = self.check_forbidden_symbols(text, forbidden)?;
        warnings.extend(self.check_broken_numbers(text)?);
        Ok(warnings)
    }

    fn check_forbidden_symbols(
        &self,
        text: &PrebuildText,
        forbidden: &Regex,
    ) -> Result<Vec<PrebuildTextWarning>> {
        let mut warnings = Vec::new();
        for (_, localization) in text.localizations.iter() {
            if let Some(found) = forbidden.find(&localization.content) {
                warnings.push(make_warning(
                    text,
                    localization,
                    WC_SANITY_FORBIDDEN_SYMBOL,
                    format!("Forbidden symbol: {}", found.as_str()),
                )?);
            }
        }
        Ok(warnings)
    }

    fn check_broken_numbers(&self, text: &PrebuildText) -> Result<Vec<PrebuildTextWarning>> {
        let canonical = text.canonical_content().ok_or_else(|| {
            Error::Invariant(format!("text {:?} has no canonical content", text.text_id))
        })?;
        let canonical_numbers = extract_numbers(canonical);

        let mut warnings = Vec::new();
        for (lang, localization) in text.localizations.iter() {
            // Empty slots are awaiting translation
            if lang == Language::CANONICAL || localization.is_empty() {
                continue;
            }
            let numbers = extract_numbers(&localization.content);
            if numbers != canonical_numbers {
                warnings.push(make_warning(
                    text,
                    localization,
                    WC_SANITY_BROKEN_NUMBERS,
                    format!(
                        "Numbers in EN: {:?}, aren't the same as in the translation: {:?}",
                        canonical_numbers, numbers
                    ),
                )?);
            }
        }
        Ok(warnings)
    }
}

#[async_trait]
impl VerificationStage for TextSanityDoctor {
    fn name(&self) -> &str {
        "doctor_sanity"
    }

    fn warning_codes(&self) -> Vec<&'static str> {
        vec![WC_SANITY_FORBIDDEN_SYMBOL, WC_SANITY_BROKEN_NUMBERS]
    }

    async fn check_question(&self, question: &PrebuildQuestion) -> Result<Vec<PrebuildTextWarning>> {
        self.check_text(&question.text, &FORBIDDEN_SYMBOL_QUESTION_RE)
    }

    async fn check_answer(
        &self,
        _question: &PrebuildQuestion,
        answer: &PrebuildAnswer,
    ) -> Result<Vec<PrebuildTextWarning>> {
        self.check_text(&answer.text, &FORBIDDEN_SYMBOL_ANSWER_RE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qdt_common::TextLocalizations;

    fn question(en: &str, es: &str) -> PrebuildQuestion {
        let mut localizations = TextLocalizations::new();
        localizations.set(Language::EN, en, Some(1));
        localizations.set(Language::ES, es, Some(2));
        PrebuildQuestion {
            test_id: 1,
            question_id: 1,
            text: PrebuildText {
                text_id: Some(10),
                ..PrebuildText::new(localizations)
            },
            answers: vec![],
            image: None,
            audio: None,
            comment_text: None,
        }
    }

    #[test]
    fn test_extract_numbers() {
        assert_eq!(extract_numbers("1,000 m then 50 and 3"), vec![3, 50, 1000]);
        assert_eq!(extract_numbers("no digits"), Vec::<u64>::new());
        assert_eq!(extract_numbers("speed 12,34"), vec![12, 34]);
    }

    #[test]
    fn test_extract_native_digits() {
        assert_eq!(extract_numbers("۵۰"), extract_numbers("50"));
        assert_eq!(extract_numbers("محدودیت ۵۰ کیلومتر"), vec![50]);
        assert_eq!(extract_numbers("٣٠ و ١,٢٠٠"), vec![30, 1200]);
        assert_eq!(extract_numbers("गति ९०"), vec![90]);
    }

    #[tokio::test]
    async fn test_native_digits_match_canonical_numbers() {
        let mut localizations = TextLocalizations::new();
        localizations.set(Language::EN, "Speed limit 50 km/h", Some(1));
        localizations.set(Language::FA, "محدودیت سرعت ۵۰ کیلومتر", Some(2));
        localizations.set(Language::ES, "Límite 60 km/h", Some(3));
        let answer = PrebuildAnswer {
            answer_id: Some(1),
            text: PrebuildText {
                text_id: Some(10),
                ..PrebuildText::new(localizations)
            },
            is_right_answer: true,
        };

        let warnings = TextSanityDoctor
            .check_answer(&question("q", "q"), &answer)
            .await
            .unwrap();

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WC_SANITY_BROKEN_NUMBERS);
        assert_eq!(warnings[0].text_localization_id, 3);
    }

    #[tokio::test]
    async fn test_forbidden_symbol() {
        let warnings = TextSanityDoctor
            .check_question(&question("foo", "es-`foo"))
            .await
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WC_SANITY_FORBIDDEN_SYMBOL);
        assert_eq!(warnings[0].content, "Forbidden symbol: `");
        assert_eq!(warnings[0].text_localization_id, 2);
    }

    #[tokio::test]
    async fn test_broken_numbers() {
        let warnings = TextSanityDoctor
            .check_question(&question("foo 1 boo 2", "es-foo 1 es-boo err"))
            .await
            .unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, WC_SANITY_BROKEN_NUMBERS);
        assert_eq!(
            warnings[0].content,
            "Numbers in EN: [1, 2], aren't the same as in the translation: [1]"
        );
    }

    #[tokio::test]
    async fn test_question_mark_only_forbidden_in_answers() {
        let question = question("Why?", "¿Por qué?");
        assert!(TextSanityDoctor.check_question(&question).await.unwrap().is_empty());

        let answer = PrebuildAnswer {
            answer_id: Some(1),
            text: question.text.clone(),
            is_right_answer: true,
        };
        let warnings = TextSanityDoctor.check_answer(&question, &answer).await.unwrap();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|w| w.content == "Forbidden symbol: ?"));
    }
}
