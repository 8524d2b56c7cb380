//! Languages and per-language text localizations
//!
//! `Language` is a closed set with a stable numeric id per variant; the ids are
//! persisted in the `Languages` table and must never be renumbered.
//! English is the canonical language: every question, answer and test text is
//! authored in English first and all other slots are derived from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Static metadata attached to each language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LanguageInfo {
    pub language_id: i64,
    pub name: &'static str,
    pub code: &'static str,
}

/// Supported dataset languages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Language {
    EN,
    FR,
    ZH,
    ES,
    RU,
    FA,
    PA,
    PT,
    KO,
}

/// Number of `Language` variants (size of every `TextLocalizations`)
pub const LANGUAGE_COUNT: usize = 9;

impl Language {
    /// All languages in slot order
    pub const ALL: [Language; LANGUAGE_COUNT] = [
        Language::EN,
        Language::FR,
        Language::ZH,
        Language::ES,
        Language::RU,
        Language::FA,
        Language::PA,
        Language::PT,
        Language::KO,
    ];

    /// The canonical (source) language of every dataset
    pub const CANONICAL: Language = Language::EN;

    pub fn info(self) -> LanguageInfo {
        let (language_id, name, code) = match self {
            Language::EN => (1, "English", "EN"),
            Language::FR => (2, "French", "FR"),
            Language::ZH => (3, "Chinese", "ZH"),
            Language::ES => (4, "Spanish", "ES"),
            Language::RU => (5, "Russian", "RU"),
            Language::FA => (6, "Farsi", "FA"),
            Language::PA => (7, "Punjabi", "PA"),
            Language::PT => (9, "Portuguese", "PT-BR"),
            Language::KO => (10, "Korean", "KO"),
        };
        LanguageInfo {
            language_id,
            name,
            code,
        }
    }

    pub fn language_id(self) -> i64 {
        self.info().language_id
    }

    /// Human readable name, used in LLM prompts
    pub fn display_name(self) -> &'static str {
        self.info().name
    }

    /// Variant name ("EN", "PT", ...), used as the key in override files
    pub fn as_str(self) -> &'static str {
        match self {
            Language::EN => "EN",
            Language::FR => "FR",
            Language::ZH => "ZH",
            Language::ES => "ES",
            Language::RU => "RU",
            Language::FA => "FA",
            Language::PA => "PA",
            Language::PT => "PT",
            Language::KO => "KO",
        }
    }

    pub fn from_id(language_id: i64) -> Option<Language> {
        Language::ALL
            .into_iter()
            .find(|lang| lang.language_id() == language_id)
    }

    /// Parse a variant name, case-insensitive
    pub fn from_name(name: &str) -> Option<Language> {
        let name = name.trim();
        Language::ALL
            .into_iter()
            .find(|lang| lang.as_str().eq_ignore_ascii_case(name))
    }

    /// Parse a comma separated list such as "EN,FR,ES"
    pub fn parse_list(list: &str) -> Result<Vec<Language>, String> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| Language::from_name(s).ok_or_else(|| format!("Unknown language '{}'", s)))
            .collect()
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One language slot of a text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextLocalization {
    pub content: String,
    /// Assigned by the store on first persistence
    #[serde(default)]
    pub localization_id: Option<i64>,
}

impl TextLocalization {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            localization_id: None,
        }
    }

    /// Content equality, identity is ignored
    pub fn same_content(&self, other: &TextLocalization) -> bool {
        self.content == other.content
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Fixed-shape mapping from every language to an optional localization
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<Language, TextLocalization>", into = "BTreeMap<Language, TextLocalization>")]
pub struct TextLocalizations {
    slots: [Option<TextLocalization>; LANGUAGE_COUNT],
}

impl TextLocalizations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Localizations holding only canonical content
    pub fn canonical_only(content: impl Into<String>) -> Self {
        let mut result = Self::new();
        result.set(Language::CANONICAL, content, None);
        result
    }

    pub fn get(&self, lang: Language) -> Option<&TextLocalization> {
        self.slots[lang.slot()].as_ref()
    }

    pub fn get_mut(&mut self, lang: Language) -> Option<&mut TextLocalization> {
        self.slots[lang.slot()].as_mut()
    }

    /// Content of a slot, `None` when the slot is absent
    pub fn content(&self, lang: Language) -> Option<&str> {
        self.get(lang).map(|local| local.content.as_str())
    }

    pub fn set(&mut self, lang: Language, content: impl Into<String>, localization_id: Option<i64>) {
        self.slots[lang.slot()] = Some(TextLocalization {
            content: content.into(),
            localization_id,
        });
    }

    /// Replace a slot's content, keeping its identity if the slot already exists
    pub fn set_content(&mut self, lang: Language, content: impl Into<String>) {
        let localization_id = self.get(lang).and_then(|local| local.localization_id);
        self.set(lang, content, localization_id);
    }

    pub fn clear(&mut self, lang: Language) {
        self.slots[lang.slot()] = None;
    }

    pub fn canonical(&self) -> Option<&TextLocalization> {
        self.get(Language::CANONICAL)
    }

    /// Present slots in language order
    pub fn iter(&self) -> impl Iterator<Item = (Language, &TextLocalization)> {
        Language::ALL
            .into_iter()
            .filter_map(move |lang| self.get(lang).map(|local| (lang, local)))
    }

    /// Map every present slot's content, keeping identities
    pub fn transform<F>(&self, mut transformer: F) -> TextLocalizations
    where
        F: FnMut(&str) -> String,
    {
        let mut result = TextLocalizations::new();
        for (lang, local) in self.iter() {
            result.set(lang, transformer(&local.content), local.localization_id);
        }
        result
    }

    /// Drop all persisted identities (used when cloning a text into a new entity)
    pub fn without_ids(&self) -> TextLocalizations {
        let mut result = self.clone();
        for slot in result.slots.iter_mut().flatten() {
            slot.localization_id = None;
        }
        result
    }
}

impl From<BTreeMap<Language, TextLocalization>> for TextLocalizations {
    fn from(map: BTreeMap<Language, TextLocalization>) -> Self {
        let mut result = TextLocalizations::new();
        for (lang, local) in map {
            result.slots[lang.slot()] = Some(local);
        }
        result
    }
}

impl From<TextLocalizations> for BTreeMap<Language, TextLocalization> {
    fn from(value: TextLocalizations) -> Self {
        value
            .iter()
            .map(|(lang, local)| (lang, local.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_ids_are_unique_and_round_trip() {
        for lang in Language::ALL {
            assert_eq!(Language::from_id(lang.language_id()), Some(lang));
            assert_eq!(Language::from_name(lang.as_str()), Some(lang));
        }
        assert_eq!(Language::from_id(8), None);
        assert_eq!(Language::PT.info().code, "PT-BR");
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            Language::parse_list("en, fr,ES").unwrap(),
            vec![Language::EN, Language::FR, Language::ES]
        );
        assert!(Language::parse_list("EN,XX").is_err());
    }

    #[test]
    fn test_set_content_keeps_identity() {
        let mut text = TextLocalizations::new();
        text.set(Language::FR, "bonjour", Some(42));
        text.set_content(Language::FR, "salut");
        text.set_content(Language::ES, "hola");

        assert_eq!(text.get(Language::FR).unwrap().localization_id, Some(42));
        assert_eq!(text.content(Language::FR), Some("salut"));
        assert_eq!(text.get(Language::ES).unwrap().localization_id, None);
        assert!(text.get(Language::ZH).is_none());
    }

    #[test]
    fn test_transform_preserves_ids_and_absent_slots() {
        let mut text = TextLocalizations::canonical_only("  foo ");
        text.set(Language::RU, " bar", Some(7));

        let trimmed = text.transform(|s| s.trim().to_string());

        assert_eq!(trimmed.content(Language::EN), Some("foo"));
        assert_eq!(trimmed.get(Language::RU).unwrap().localization_id, Some(7));
        assert!(trimmed.get(Language::FR).is_none());
        // Source untouched
        assert_eq!(text.content(Language::EN), Some("  foo "));
    }

    #[test]
    fn test_json_shape_is_language_map() {
        let mut text = TextLocalizations::canonical_only("foo");
        text.set(Language::ES, "es-foo", Some(3));

        let json = serde_json::to_value(&text).unwrap();
        assert_eq!(json["EN"]["content"], "foo");
        assert_eq!(json["ES"]["localization_id"], 3);

        let back: TextLocalizations = serde_json::from_value(json).unwrap();
        assert_eq!(back, text);
    }
}
