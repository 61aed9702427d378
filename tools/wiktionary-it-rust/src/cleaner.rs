//! Markup cleaner: turns one line (or an accumulated chunk) of wikitext into
//! plain text.
//!
//! The pipeline is a fixed sequence of small string transforms, each exposed
//! as its own function so it can be exercised on its own. Order matters: the
//! headword placeholder is substituted before generic templates are dropped,
//! and link collapsing runs after every template rewrite.

use lazy_static::lazy_static;
use regex::{Captures, NoExpand, Regex};

use crate::config::ParserConfig;

/// Upper bound on innermost-first passes over nested spans.
const MAX_NESTING_PASSES: usize = 16;

/// Characters trimmed from the start of cleaned text. `#` is excluded because
/// it delimits `##term##` tags, `(` because labels open with it.
const LEADING_PUNCT: &[char] = &[
    '.', ',', ';', ':', '!', '?', ')', ']', '}', '|', '*', '-', '\u{2013}', '\u{2014}', '/', '\\',
    '"', '\u{bb}',
];

lazy_static! {
    static ref HEADWORD: Regex = Regex::new(r"\{\{[Pp]n(?:\|[^{}]*)?\}\}").unwrap();
    static ref REFERENCE: Regex = Regex::new(r"(?s)<ref[^>]*/>|<ref[^>]*>.*?</ref\s*>").unwrap();
    static ref FILE_EMBED: Regex = Regex::new(r"\[\[(?i:file|immagine|image):.*?\]\]").unwrap();
    static ref SEE_ALSO: Regex = Regex::new(r"\{\{[Vv]d\|([^{}]*)\}\}").unwrap();
    static ref ETYM_LINK: Regex = Regex::new(r"\{\{[Ee]tim-link\|([^{}]*)\}\}").unwrap();
    static ref LANG_CODE: Regex = Regex::new(r"\{\{(\w+)\}\}").unwrap();
    static ref TERM: Regex = Regex::new(r"\{\{[Tt]erm\|([^{}|]*)(?:\|[^{}]*)?\}\}").unwrap();
    static ref LABEL: Regex = Regex::new(r"\{\{([^{}|]+)(?:\|[^{}]*)?\}\}").unwrap();
    static ref TEMPLATE: Regex = Regex::new(r"\{\{[^{}]*\}\}").unwrap();
    static ref PIPED_LINK: Regex = Regex::new(r"\[\[([^\[\]|]*)\|([^\[\]]*)\]\]").unwrap();
    static ref PLAIN_LINK: Regex = Regex::new(r"\[\[([^\[\]|:]+)\]\]").unwrap();
    static ref LEFTOVER_LINK: Regex = Regex::new(r"\[\[\w.*?\]\]").unwrap();
    static ref EMPHASIS: Regex = Regex::new(r"'{2,3}").unwrap();
    static ref PAIRED_TAG: Regex =
        Regex::new(r"(?s)<[a-zA-Z][a-zA-Z0-9]*(?:\s[^<>]*)?>(.*?)</[a-zA-Z][a-zA-Z0-9]*\s*>").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s{2,}").unwrap();
}

/// Markup cleaner bound to the lookup tables of a [`ParserConfig`].
#[derive(Debug, Clone, Copy)]
pub struct Cleaner<'a> {
    config: &'a ParserConfig,
}

impl<'a> Cleaner<'a> {
    pub fn new(config: &'a ParserConfig) -> Self {
        Cleaner { config }
    }

    /// Run the whole pipeline over `raw`.
    pub fn clean(&self, raw: &str, headword: &str) -> String {
        let text = strip_list_markers(raw);
        let text = substitute_headword(text, headword);
        let text = remove_references(&text);
        let text = remove_file_embeds(&text);
        let text = rewrite_see_also(&text);
        let text = rewrite_etym_links(&text);
        let text = self.substitute_lang_codes(&text);
        let text = rewrite_terms(&text);
        let text = self.substitute_register_labels(&text);
        let text = strip_templates(&text);
        let text = collapse_links(&text);
        let text = strip_leftover_links(&text);
        let text = strip_emphasis(&text);
        let text = collapse_tags(&text);
        let text = collapse_whitespace(&text);
        trim_leading_punct(&text).to_string()
    }

    /// `{{la}}` → `latino`; unknown codes are left as they are.
    pub fn substitute_lang_codes(&self, text: &str) -> String {
        LANG_CODE
            .replace_all(text, |caps: &Captures| match self.config.lang_name(&caps[1]) {
                Some(name) => name.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    /// `{{Fig}}` → `(senso figurato)`; undefined labels fall through.
    pub fn substitute_register_labels(&self, text: &str) -> String {
        LABEL
            .replace_all(text, |caps: &Captures| {
                match self.config.register_label(caps[1].trim()) {
                    Some(label) => label.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Drop leading `*`, `#` and `:` list/indent markers.
pub fn strip_list_markers(line: &str) -> &str {
    line.trim_start_matches(|c| matches!(c, '*' | '#' | ':'))
}

pub fn substitute_headword(text: &str, headword: &str) -> String {
    HEADWORD.replace_all(text, NoExpand(headword)).into_owned()
}

pub fn remove_references(text: &str) -> String {
    REFERENCE.replace_all(text, "").into_owned()
}

pub fn remove_file_embeds(text: &str) -> String {
    FILE_EMBED.replace_all(text, "").into_owned()
}

/// `vedi` + the second argument when piped, else the first.
fn pointer_target(args: &str) -> String {
    let mut parts = args.split('|');
    let first = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or(first);
    format!("vedi {}", target.trim())
}

/// `{{Vd|Afghanistan#Italiano|Afghanistan}}` → `vedi Afghanistan`.
pub fn rewrite_see_also(text: &str) -> String {
    SEE_ALSO
        .replace_all(text, |caps: &Captures| pointer_target(&caps[1]))
        .into_owned()
}

/// `{{Etim-link|casa}}` → `vedi casa`.
pub fn rewrite_etym_links(text: &str) -> String {
    ETYM_LINK
        .replace_all(text, |caps: &Captures| pointer_target(&caps[1]))
        .into_owned()
}

/// `{{Term|medicina|it}}` → `##medicina##`.
pub fn rewrite_terms(text: &str) -> String {
    TERM.replace_all(text, |caps: &Captures| format!("##{}##", caps[1].trim()))
        .into_owned()
}

/// Remove every remaining `{{...}}`, innermost first so nested templates go
/// away whole.
pub fn strip_templates(text: &str) -> String {
    let mut text = text.to_string();
    for _ in 0..MAX_NESTING_PASSES {
        if !TEMPLATE.is_match(&text) {
            break;
        }
        text = TEMPLATE.replace_all(&text, "").into_owned();
    }
    text
}

/// `[[target|display]]` → `display`, `[[word]]` → `word`.
pub fn collapse_links(text: &str) -> String {
    let text = PIPED_LINK.replace_all(text, |caps: &Captures| {
        let display = caps[2].trim();
        if display.is_empty() {
            caps[1].to_string()
        } else {
            display.to_string()
        }
    });
    PLAIN_LINK.replace_all(&text, "$1").into_owned()
}

/// Anything still shaped like `[[word...]]` (category and interwiki links).
pub fn strip_leftover_links(text: &str) -> String {
    LEFTOVER_LINK.replace_all(text, "").into_owned()
}

pub fn strip_emphasis(text: &str) -> String {
    EMPHASIS.replace_all(text, "").into_owned()
}

/// `<sup>2</sup>` → `2`.
pub fn collapse_tags(text: &str) -> String {
    let mut text = text.to_string();
    for _ in 0..MAX_NESTING_PASSES {
        if !PAIRED_TAG.is_match(&text) {
            break;
        }
        text = PAIRED_TAG.replace_all(&text, "$1").into_owned();
    }
    text
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").into_owned()
}

pub fn trim_leading_punct(text: &str) -> &str {
    text.trim_start_matches(|c: char| c.is_whitespace() || LEADING_PUNCT.contains(&c))
        .trim_end()
}
