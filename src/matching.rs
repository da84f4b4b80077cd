//! Hypothesis matching
//!
//! Decides whether a recogniser hypothesis counts as the expected word for a
//! stage. Matching is deliberately lenient: recognisers append extra words and
//! transcribe niqqud inconsistently, so a hypothesis matches when it *contains*
//! one of the accepted alternatives, either verbatim or with vowel points
//! removed from both sides.
//!
//! Containment on a partial (interim) transcript can accept early when an
//! alternative is very short, e.g. a two-letter candidate. That behaviour is
//! kept as-is; see DESIGN.md.

use regex::Regex;
use std::sync::LazyLock;

use crate::trainer::Stage;
use crate::words::WordEntry;

/// Hebrew vowel points and cantillation marks stripped before comparison
static NIQQUD_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{05B0}-\x{05C7}\x{05C8}-\x{05CF}]").unwrap());

/// Any character from the Hebrew block
static HEBREW_SCRIPT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\x{0590}-\x{05FF}]").unwrap());

/// How a hypothesis matched an alternative
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// Lower-cased hypothesis contains the lower-cased alternative
    Contains,
    /// Only matched once niqqud was stripped from both sides
    VowelStripped,
}

/// A successful match, kept for diagnostics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchDetail {
    pub hypothesis: String,
    pub alternative: String,
    pub kind: MatchKind,
}

/// Remove niqqud and lower-case
pub fn strip_niqqud(text: &str) -> String {
    NIQQUD_PATTERN.replace_all(text, "").to_lowercase()
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

fn hebrew_match_kind(hypothesis: &str, alternative: &str) -> Option<MatchKind> {
    if is_blank(hypothesis) || is_blank(alternative) {
        return None;
    }

    if hypothesis
        .to_lowercase()
        .contains(&alternative.to_lowercase())
    {
        return Some(MatchKind::Contains);
    }

    let stripped_alternative = strip_niqqud(alternative);
    if !stripped_alternative.trim().is_empty()
        && strip_niqqud(hypothesis).contains(&stripped_alternative)
    {
        return Some(MatchKind::VowelStripped);
    }

    None
}

fn english_match_kind(hypothesis: &str, alternative: &str) -> Option<MatchKind> {
    if is_blank(hypothesis) || is_blank(alternative) {
        return None;
    }

    hypothesis
        .to_lowercase()
        .contains(&alternative.to_lowercase())
        .then_some(MatchKind::Contains)
}

/// Whether a Hebrew-stage hypothesis matches any of the word's Hebrew forms
pub fn matches_hebrew(hypothesis: &str, word: &WordEntry) -> bool {
    word.he_alternatives
        .iter()
        .any(|alt| hebrew_match_kind(hypothesis, alt).is_some())
}

/// Whether a translation-stage hypothesis matches any of the word's English forms
pub fn matches_english(hypothesis: &str, word: &WordEntry) -> bool {
    word.en_alternatives
        .iter()
        .any(|alt| english_match_kind(hypothesis, alt).is_some())
}

/// Whether `text` carries Hebrew script while the stage expects English
///
/// Such hypotheses are treated as noise or tail audio from the Hebrew stage
/// and are never considered candidates.
pub fn contains_foreign_script(text: &str, stage: Stage) -> bool {
    stage == Stage::Translation && HEBREW_SCRIPT_PATTERN.is_match(text)
}

/// The alternatives a stage accepts for `word`
pub fn expected_alternatives(stage: Stage, word: &WordEntry) -> &[String] {
    match stage {
        Stage::Hebrew => &word.he_alternatives,
        Stage::Translation => &word.en_alternatives,
        Stage::Start | Stage::Complete => &[],
    }
}

/// Find the first hypothesis that matches `word` for `stage`
///
/// Hypotheses are tried in recogniser order, alternatives in list order.
/// Stages that don't listen never match.
pub fn find_match<'a, I>(stage: Stage, hypotheses: I, word: &WordEntry) -> Option<MatchDetail>
where
    I: IntoIterator<Item = &'a str>,
{
    let matcher: fn(&str, &str) -> Option<MatchKind> = match stage {
        Stage::Hebrew => hebrew_match_kind,
        Stage::Translation => english_match_kind,
        Stage::Start | Stage::Complete => return None,
    };

    for hypothesis in hypotheses {
        if contains_foreign_script(hypothesis, stage) {
            continue;
        }
        for alternative in expected_alternatives(stage, word) {
            if let Some(kind) = matcher(hypothesis, alternative) {
                tracing::debug!(
                    "Match found: {:?} contains {:?} ({:?})",
                    hypothesis,
                    alternative,
                    kind
                );
                return Some(MatchDetail {
                    hypothesis: hypothesis.to_string(),
                    alternative: alternative.clone(),
                    kind,
                });
            }
        }
    }

    None
}
