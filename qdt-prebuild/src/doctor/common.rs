//! Warning codes and helpers shared by the doctors

use crate::llm::is_ok_response;
use crate::types::{PrebuildText, PrebuildTextWarning};
use qdt_common::{Error, Language, Result, TextLocalization};

/// Canonical text needs a fix
pub const WC_CANONICAL_NO_ORIG: &str = "CNO";
/// Forbidden symbol in a localization
pub const WC_SANITY_FORBIDDEN_SYMBOL: &str = "SFS";
/// Numbers differ from the canonical text
pub const WC_SANITY_BROKEN_NUMBERS: &str = "SBN";
/// Translation does not match the canonical meaning
pub const WC_TRANSLATION: &str = "TRN";

/// Warning for one localization of a persisted text.
///
/// Both ids must be known; checks only run on texts loaded from the store.
pub fn make_warning(
    text: &PrebuildText,
    localization: &TextLocalization,
    code: &str,
    content: impl Into<String>,
) -> Result<PrebuildTextWarning> {
    let text_id = text
        .text_id
        .ok_or_else(|| Error::Invariant(format!("{} check on a text without id", code)))?;
    let localization_id = localization.localization_id.ok_or_else(|| {
        Error::Invariant(format!(
            "{} check on text {} with an unsaved localization",
            code, text_id
        ))
    })?;
    Ok(PrebuildTextWarning::new(text_id, localization_id, code, content))
}

/// Turn a reviewer reply into a warning unless it is an OK
pub fn warning_from_response(
    text: &PrebuildText,
    localization: &TextLocalization,
    code: &str,
    response: &str,
) -> Result<Option<PrebuildTextWarning>> {
    if is_ok_response(response) {
        return Ok(None);
    }
    make_warning(text, localization, code, response.trim()).map(Some)
}

/// The non-empty canonical localization of `text`
pub fn canonical_localization(text: &PrebuildText) -> Result<&TextLocalization> {
    text.localizations
        .get(Language::CANONICAL)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| {
            Error::Invariant(format!("text {:?} has no canonical content", text.text_id))
        })
}
