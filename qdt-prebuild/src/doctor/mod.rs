//! Doctor checks
//!
//! Three independent checkers, each a [`VerificationStage`](crate::stage::VerificationStage)
//! owning its own warning codes:
//!
//! - [`TextSanityDoctor`]: local scans for forbidden symbols and broken numbers
//! - [`TextCanonicalDoctor`]: LLM review of the English text
//! - [`TextTranslationDoctor`]: LLM review of every translation against English

pub mod canonical;
pub mod common;
pub mod sanity;
pub mod translation;

pub use canonical::TextCanonicalDoctor;
pub use common::{WC_CANONICAL_NO_ORIG, WC_SANITY_BROKEN_NUMBERS, WC_SANITY_FORBIDDEN_SYMBOL, WC_TRANSLATION};
pub use sanity::TextSanityDoctor;
pub use translation::TextTranslationDoctor;
