//! Vocabulary word list
//!
//! Holds the ordered sequence of words a training run walks through. The list
//! is immutable once loaded; runs only ever read from it by index.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Errors raised while loading or indexing a word list
#[derive(Debug, thiserror::Error)]
pub enum WordListError {
    #[error("Word index {index} out of range (list has {len} words)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Word {index} ({he:?}) has no {field} alternatives")]
    EmptyAlternatives {
        index: usize,
        he: String,
        field: &'static str,
    },

    #[error("Failed to read word list: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse word list: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A single vocabulary entry
///
/// `he` is what gets displayed. The alternative lists hold every spelling the
/// recogniser may plausibly produce; the first entry of each is canonical.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordEntry {
    /// Hebrew word as displayed (usually with niqqud)
    pub he: String,
    /// Accepted Hebrew transcriptions
    pub he_alternatives: Vec<String>,
    /// English meaning (never displayed during a run)
    pub en: String,
    /// Accepted English transcriptions
    pub en_alternatives: Vec<String>,
}

impl WordEntry {
    pub fn new(he: &str, he_alternatives: &[&str], en: &str, en_alternatives: &[&str]) -> Self {
        Self {
            he: he.to_string(),
            he_alternatives: he_alternatives.iter().map(|s| s.to_string()).collect(),
            en: en.to_string(),
            en_alternatives: en_alternatives.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Hebrew as a recogniser would transcribe it
    ///
    /// The first alternative carries niqqud; recognisers return the unpointed
    /// spelling listed after it.
    pub fn spoken_hebrew(&self) -> &str {
        self.he_alternatives
            .get(1)
            .or_else(|| self.he_alternatives.first())
            .map(String::as_str)
            .unwrap_or(&self.he)
    }

    pub fn spoken_english(&self) -> &str {
        self.en_alternatives.first().map(String::as_str).unwrap_or(&self.en)
    }
}

/// Ordered, read-only list of words for a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WordList {
    words: Vec<WordEntry>,
}

impl WordList {
    /// Build a list, rejecting entries with an empty alternative list
    pub fn new(words: Vec<WordEntry>) -> Result<Self, WordListError> {
        for (index, word) in words.iter().enumerate() {
            if word.he_alternatives.is_empty() {
                return Err(WordListError::EmptyAlternatives {
                    index,
                    he: word.he.clone(),
                    field: "Hebrew",
                });
            }
            if word.en_alternatives.is_empty() {
                return Err(WordListError::EmptyAlternatives {
                    index,
                    he: word.he.clone(),
                    field: "English",
                });
            }
        }
        Ok(Self { words })
    }

    /// The built-in three-word list
    pub fn builtin() -> Self {
        Self {
            words: vec![
                WordEntry::new(
                    "סַבָּא",
                    &["סַבָּא", "סבא", "סאבא"],
                    "grandfather",
                    &["grandfather", "grandpa", "granddad", "grandpapa"],
                ),
                WordEntry::new(
                    "קָנָה",
                    &["קָנָה", "קנה", "קאנה"],
                    "bought",
                    &["bought", "bot", "brought", "buy", "but", "bugs"],
                ),
                WordEntry::new(
                    "פָּרָה",
                    &["פָּרָה", "פרה", "פארה"],
                    "cow",
                    &["cow", "Coco"],
                ),
            ],
        }
    }

    /// Parse a JSON array of entries
    pub fn from_json(json: &str) -> Result<Self, WordListError> {
        let words: Vec<WordEntry> = serde_json::from_str(json)?;
        Self::new(words)
    }

    /// Load a JSON word list from disk
    pub fn load(path: &Path) -> Result<Self, WordListError> {
        let contents = fs::read_to_string(path)?;
        let list = Self::from_json(&contents)?;
        tracing::info!("Loaded {} words from {:?}", list.len(), path);
        Ok(list)
    }

    pub fn get(&self, index: usize) -> Result<&WordEntry, WordListError> {
        self.words.get(index).ok_or(WordListError::IndexOutOfRange {
            index,
            len: self.words.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WordEntry> {
        self.words.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_list_has_three_words() {
        let list = WordList::builtin();
        assert_eq!(list.len(), 3);
        assert_eq!(list.get(0).unwrap().en, "grandfather");
        assert_eq!(list.get(2).unwrap().en, "cow");
    }

    #[test]
    fn test_get_out_of_range() {
        let list = WordList::builtin();
        let err = list.get(3).unwrap_err();
        assert!(matches!(
            err,
            WordListError::IndexOutOfRange { index: 3, len: 3 }
        ));
    }

    #[test]
    fn test_spoken_answers() {
        let list = WordList::builtin();
        let word = list.get(1).unwrap();
        assert_eq!(word.spoken_hebrew(), "קנה");
        assert_eq!(word.spoken_english(), "bought");

        let single = WordEntry::new("אַבָּא", &["אבא"], "father", &["dad"]);
        assert_eq!(single.spoken_hebrew(), "אבא");
        assert_eq!(single.spoken_english(), "dad");
    }

    #[test]
    fn test_from_json() {
        let json = r#"[
            {"he": "אַבָּא", "he_alternatives": ["אבא"], "en": "father", "en_alternatives": ["father", "dad"]}
        ]"#;
        let list = WordList::from_json(json).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get(0).unwrap().en_alternatives, vec!["father", "dad"]);
    }

    #[test]
    fn test_empty_alternatives_rejected() {
        let json = r#"[
            {"he": "אבא", "he_alternatives": ["אבא"], "en": "father", "en_alternatives": []}
        ]"#;
        let err = WordList::from_json(json).unwrap_err();
        assert!(matches!(
            err,
            WordListError::EmptyAlternatives { index: 0, field: "English", .. }
        ));
    }

    #[test]
    fn test_malformed_json_is_parse_error() {
        let err = WordList::from_json("{not json").unwrap_err();
        assert!(matches!(err, WordListError::Parse(_)));
    }

    #[test]
    fn test_empty_list_is_allowed() {
        let list = WordList::new(Vec::new()).unwrap();
        assert!(list.is_empty());
        assert!(list.get(0).is_err());
    }
}
