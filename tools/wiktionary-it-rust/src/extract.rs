//! Field extractors: one recognizer per kind of line.
//!
//! Each function here looks at a single raw line and either recognizes it
//! (returning the extracted value) or declines. None of them touch the record;
//! the state machine in [`crate::parser`] decides what a match means.

use lazy_static::lazy_static;
use regex::Regex;

use crate::cleaner::{self, Cleaner};
use crate::config::ParserConfig;

/// Longest syllable token (in chars) accepted before the whole line is
/// treated as an unparsed sentence.
pub const MAX_SYLLABLE_LEN: usize = 8;

/// Tag text of the "Varie lingue" block, which never opens a slot.
pub const MULTIPLE_LANGUAGES_TAG: &str = "Varie lingue";

/// Section templates that share the `{{-tag-|...}}` shape but are not parts of speech.
const NON_POS_TAGS: &[&str] = &[
    "sill", "etim", "pron", "sin", "ant", "rel", "der", "var", "alter", "ipon", "iperon", "trad",
    "trad1", "trad2", "ref", "pro", "prov", "nota", "noetim", "cit", "sound", "vedi", "vedi anche",
];

/// Boilerplate shown on pages whose syllabification has not been written yet.
const SYLLABLE_PLACEHOLDERS: &[&str] = &[
    "sillabazione mancante",
    "non sillabato",
    "sillabazione non disponibile",
    "se vuoi, aggiungila",
];

lazy_static! {
    static ref LANG_HEADING: Regex = Regex::new(r"^==\{\{-?([^{}|=]+?)-?\}\}==$").unwrap();
    static ref PRON_MARKER: Regex = Regex::new(r"\{\{-pron-(?:\|[^{}]*)?\}\}").unwrap();
    static ref IPA: Regex = Regex::new(r"\{\{IPA\|/(.*?)/\}\}").unwrap();
    static ref SYLL_MARKER: Regex = Regex::new(r"\{\{-sill-(?:\|[^{}]*)?\}\}").unwrap();
    static ref SELF_CLOSING_TAG: Regex = Regex::new(r"<[^<>]*/>").unwrap();
    static ref POS_MARKER: Regex = Regex::new(r"\{\{-([^{}|]+?)-\|(?:\|?\w*)*\}\}").unwrap();
    static ref MORPHOLOGY: Regex = Regex::new(
        r"^\s*\{\{[Pp]n[^{}]*\}\}\s{0,3}''\s*((?:m|f|inv)\b[^']*)''(?:[^'{}]{0,6}''\s*((?:m|f|inv)\b[^']*)'')?"
    ).unwrap();
    static ref ETYM_MARKER: Regex = Regex::new(r"\{\{-etim-(?:\|[^{}]*)?\}\}").unwrap();
    static ref NO_ETYM: Regex = Regex::new(r"\{\{[Nn]oetim(?:\|[^{}]*)?\}\}").unwrap();
    static ref RELATED_MARKER: Regex = Regex::new(r"\{\{-(sin|ant)-(?:\|[^{}]*)?\}\}").unwrap();
    static ref NO_DEF: Regex = Regex::new(r"\{\{[Nn]odef(?:\|[^{}]*)?\}\}").unwrap();
    static ref CROSS_REFERENCE_LINE: Regex = Regex::new(r"^\s*\{\{[Vv]edi\|[^{}]*\}\}\s*$").unwrap();
    static ref SECTION_MARKER: Regex = Regex::new(r"^\s*\{\{-[^{}|]+-(?:\|[^{}]*)?\}\}").unwrap();
    static ref TERMINATOR: Regex = Regex::new(
        r"^\{\{-(?:der|rel|var|alter|ipon|iperon|nota|disambigua|prov|trad|trad1|ref|pro)-(?:\||\}\})"
    ).unwrap();
    static ref UTILITY_COMMENT: Regex = Regex::new(r"^<!--\s*(?i:templates?\s+utili)").unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Section boundaries
// ─────────────────────────────────────────────────────────────────────────────

/// Language code of a `== {{-it-}} ==` heading, or `None` for any other line.
pub fn language_heading(line: &str) -> Option<String> {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();
    LANG_HEADING.captures(&compact).map(|cap| cap[1].to_string())
}

/// Section templates after which nothing of interest follows.
pub fn is_terminator(trimmed: &str) -> bool {
    TERMINATOR.is_match(trimmed)
}

/// The comment block of utility templates that closes many pages.
pub fn is_utility_comment(line: &str) -> bool {
    UTILITY_COMMENT.is_match(line.trim_start())
}

/// A line that starts with any `{{-tag-}}` section template.
pub fn is_section_marker(line: &str) -> bool {
    SECTION_MARKER.is_match(line)
}

pub fn is_cross_reference_line(line: &str) -> bool {
    CROSS_REFERENCE_LINE.is_match(line)
}

pub fn is_image_line(line: &str) -> bool {
    line.starts_with('[')
}

// ─────────────────────────────────────────────────────────────────────────────
// Pronunciation and syllables
// ─────────────────────────────────────────────────────────────────────────────

pub fn is_pronunciation_marker(line: &str) -> bool {
    PRON_MARKER.is_match(line)
}

/// Every `{{IPA|/.../}}` transcription on the line, in order.
pub fn ipa_transcriptions(line: &str) -> Vec<String> {
    IPA.captures_iter(line)
        .map(|cap| cap[1].trim().to_string())
        .filter(|ipa| !ipa.is_empty())
        .collect()
}

pub fn is_syllable_marker(line: &str) -> bool {
    SYLL_MARKER.is_match(line)
}

/// Syllables of a `;ca | sa` line. `None` when the line has a different
/// shape, is a placeholder, or does not split into plausible syllables.
pub fn syllable_line(line: &str) -> Option<Vec<String>> {
    let rest = line.strip_prefix(';')?;
    let lowered = rest.to_lowercase();
    if SYLLABLE_PLACEHOLDERS.iter().any(|p| lowered.contains(p)) {
        return None;
    }
    split_syllables(rest)
}

/// Split a syllabification into tokens.
///
/// `|` separates syllables; `-` and `–` separate compound parts and are kept
/// as tokens of their own; whitespace is ignored.
pub fn split_syllables(text: &str) -> Option<Vec<String>> {
    let text = cleaner::strip_emphasis(text);
    let text = SELF_CLOSING_TAG.replace_all(&text, "");

    let mut tokens = Vec::new();
    let mut current = String::new();
    let flush = |current: &mut String, tokens: &mut Vec<String>| {
        if !current.is_empty() {
            tokens.push(std::mem::take(current));
        }
    };

    for c in text.chars() {
        match c {
            '|' => flush(&mut current, &mut tokens),
            '-' | '\u{2013}' => {
                flush(&mut current, &mut tokens);
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {}
            c => current.push(c),
        }
    }
    flush(&mut current, &mut tokens);

    if tokens.is_empty() || tokens.iter().any(|t| t.chars().count() > MAX_SYLLABLE_LEN) {
        return None;
    }
    Some(tokens)
}

// ─────────────────────────────────────────────────────────────────────────────
// Part of speech
// ─────────────────────────────────────────────────────────────────────────────

/// Capture section reached through a mistagged `{{-sill-|it}}`-style marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Pronunciation,
    Syllables,
    Etymology,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagMarker {
    /// A real part-of-speech tag, already alias-corrected.
    Tag(String),
    Redirect(Section),
    /// The "Varie lingue" block.
    MultipleLanguages,
    /// A non-POS section template; its own extractor handles the line.
    Excluded,
}

pub fn part_of_speech(line: &str, config: &ParserConfig) -> Option<TagMarker> {
    let cap = POS_MARKER.captures(line)?;
    let raw = cap[1].trim();

    let marker = match raw {
        "sill" => TagMarker::Redirect(Section::Syllables),
        "pron" => TagMarker::Redirect(Section::Pronunciation),
        "etim" => TagMarker::Redirect(Section::Etymology),
        _ if NON_POS_TAGS.contains(&raw) => TagMarker::Excluded,
        _ if raw.eq_ignore_ascii_case(MULTIPLE_LANGUAGES_TAG) => TagMarker::MultipleLanguages,
        _ => TagMarker::Tag(config.canonical_tag(raw)),
    };
    Some(marker)
}

// ─────────────────────────────────────────────────────────────────────────────
// Morphology
// ─────────────────────────────────────────────────────────────────────────────

fn compact_morphology(group: &str) -> String {
    cleaner::trim_leading_punct(group)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// `{{Pn|w}} ''f sing''` → `fsing`; two spans are joined with ` e `.
pub fn morphology(line: &str) -> Option<String> {
    let cap = MORPHOLOGY.captures(line)?;
    let parts: Vec<String> = [cap.get(1), cap.get(2)]
        .into_iter()
        .flatten()
        .map(|m| compact_morphology(m.as_str()))
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" e "))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Etymology
// ─────────────────────────────────────────────────────────────────────────────

pub fn is_etymology_marker(line: &str) -> bool {
    ETYM_MARKER.is_match(line)
}

pub fn is_no_etymology(line: &str) -> bool {
    NO_ETYM.is_match(line)
}

pub fn is_list_line(line: &str) -> bool {
    line.starts_with(['#', '*', ':'])
}

// ─────────────────────────────────────────────────────────────────────────────
// Synonyms and antonyms
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Synonyms,
    Antonyms,
}

pub fn related_marker(line: &str) -> Option<Relation> {
    let cap = RELATED_MARKER.captures(line)?;
    match &cap[1] {
        "sin" => Some(Relation::Synonyms),
        _ => Some(Relation::Antonyms),
    }
}

/// Items of a `* a, b (c, d)` bullet line; `None` for any other shape.
pub fn related_terms(line: &str, cleaner: &Cleaner<'_>, headword: &str) -> Option<Vec<String>> {
    if !line.starts_with('*') {
        return None;
    }
    let text = cleaner.clean(line, headword);
    let text = text.trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':'));
    Some(split_top_level_commas(text))
}

/// Split on commas outside parentheses; empty items are dropped.
pub fn split_top_level_commas(text: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                items.push(&text[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    items.push(&text[start..]);

    items
        .into_iter()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Definitions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefinitionLine {
    /// `# {{Nodef|it}}`: skipped.
    NoDefinition,
    /// `#*` or `#:` sub-bullet.
    SubBullet,
    Definition {
        /// Ends with `:`, so the sub-bullets that follow belong to it.
        introduces_list: bool,
    },
}

pub fn definition_line(line: &str) -> Option<DefinitionLine> {
    let rest = line.strip_prefix('#')?;
    if NO_DEF.is_match(rest) {
        return Some(DefinitionLine::NoDefinition);
    }
    if rest.starts_with(['*', ':']) {
        return Some(DefinitionLine::SubBullet);
    }
    Some(DefinitionLine::Definition {
        introduces_list: line.trim_end().ends_with(':'),
    })
}
