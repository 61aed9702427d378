//! Line-oriented state machine that turns one page body into an [`Entry`].
//!
//! Every line goes through the same fixed sequence of checks. The first check
//! that consumes the line ends its processing; a capture mode that declines a
//! line closes and lets the remaining checks see it.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, error};

use crate::cleaner::Cleaner;
use crate::config::ParserConfig;
use crate::error::{ExtractError, Result};
use crate::extract::{self, DefinitionLine, Relation, Section, TagMarker};
use crate::record::{Entry, EntryBuilder};

/// Which kind of continuation line the parser currently expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaptureMode {
    #[default]
    Closed,
    Pronunciation,
    Syllables,
    Etymology,
    Related(Relation),
}

impl From<Section> for CaptureMode {
    fn from(section: Section) -> Self {
        match section {
            Section::Pronunciation => CaptureMode::Pronunciation,
            Section::Syllables => CaptureMode::Syllables,
            Section::Etymology => CaptureMode::Etymology,
        }
    }
}

/// Whether the line loop continues after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Next,
    Stop,
}

/// Parser for a single page. Construct, feed the body, keep the entry.
pub struct PageParser<'a> {
    config: &'a ParserConfig,
    cleaner: Cleaner<'a>,
    title: &'a str,
    builder: EntryBuilder,
    mode: CaptureMode,
    in_target_language: bool,
    /// The last definition ended with `:`; its sub-bullets are definitions.
    list_introduced: bool,
}

impl<'a> PageParser<'a> {
    pub fn new(config: &'a ParserConfig, title: &'a str) -> Self {
        PageParser {
            config,
            cleaner: Cleaner::new(config),
            title,
            builder: EntryBuilder::new(),
            mode: CaptureMode::Closed,
            in_target_language: false,
            list_introduced: false,
        }
    }

    /// Run the line loop over `body`. `None` when the page has no section in
    /// the target language.
    pub fn parse(mut self, body: &str) -> Option<Entry> {
        for line in body.lines() {
            if self.step(line) == Flow::Stop {
                break;
            }
        }
        self.builder.finish()
    }

    fn step(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            self.mode = CaptureMode::Closed;
            return Flow::Next;
        }

        if extract::is_utility_comment(line) {
            return Flow::Stop;
        }

        if self.continue_capture(line) {
            return Flow::Next;
        }

        if extract::is_cross_reference_line(line) || extract::is_image_line(line) {
            return Flow::Next;
        }

        if line.starts_with('=') {
            return self.heading(line);
        }

        if !self.in_target_language {
            return Flow::Next;
        }

        self.builder.ensure_placeholder();

        let trimmed = line.trim_start();
        if extract::is_terminator(trimmed) {
            return Flow::Stop;
        }

        match extract::part_of_speech(line, self.config) {
            Some(TagMarker::Redirect(section)) => {
                self.mode = section.into();
                return Flow::Next;
            }
            Some(TagMarker::MultipleLanguages) => return Flow::Next,
            Some(TagMarker::Tag(tag)) => {
                if self.builder.open_slot(&tag) {
                    self.mode = CaptureMode::Closed;
                    self.list_introduced = false;
                    return Flow::Next;
                }
            }
            Some(TagMarker::Excluded) | None => {}
        }

        if self.open_capture(line) {
            return Flow::Next;
        }

        self.definition(line);
        Flow::Next
    }

    /// Language headings. Other `=` headings carry nothing and are skipped.
    fn heading(&mut self, line: &str) -> Flow {
        match extract::language_heading(line) {
            Some(code) if code == self.config.target_lang => {
                self.builder.start_entry();
                self.in_target_language = true;
                self.mode = CaptureMode::Closed;
                self.list_introduced = false;
                Flow::Next
            }
            Some(code) if self.builder.has_entry() => {
                debug!(title = self.title, lang = %code, "next language section, stopping");
                Flow::Stop
            }
            Some(_) | None => Flow::Next,
        }
    }

    /// Feed the line to the open capture mode. Returns true when consumed.
    fn continue_capture(&mut self, line: &str) -> bool {
        let Some(entry) = self.builder.entry_mut() else {
            self.mode = CaptureMode::Closed;
            return false;
        };

        match self.mode {
            CaptureMode::Closed => false,
            CaptureMode::Pronunciation => {
                let ipa = extract::ipa_transcriptions(line);
                if ipa.is_empty() {
                    self.mode = CaptureMode::Closed;
                    false
                } else {
                    entry.ipa.extend(ipa);
                    true
                }
            }
            CaptureMode::Syllables => {
                self.mode = CaptureMode::Closed;
                if !line.starts_with(';') {
                    return false;
                }
                if let Some(syllables) = extract::syllable_line(line) {
                    entry.syllables = syllables;
                }
                true
            }
            CaptureMode::Etymology => {
                if extract::is_no_etymology(line) {
                    self.mode = CaptureMode::Closed;
                    return true;
                }
                if extract::is_section_marker(line) {
                    self.mode = CaptureMode::Closed;
                    return false;
                }
                entry.push_etymology(&self.cleaner.clean(line, self.title));
                if !extract::is_list_line(line) {
                    self.mode = CaptureMode::Closed;
                }
                true
            }
            CaptureMode::Related(relation) => {
                match extract::related_terms(line, &self.cleaner, self.title) {
                    Some(items) => {
                        match relation {
                            Relation::Synonyms => entry.synonyms.extend(items),
                            Relation::Antonyms => entry.antonyms.extend(items),
                        }
                        true
                    }
                    None => {
                        self.mode = CaptureMode::Closed;
                        false
                    }
                }
            }
        }
    }

    /// Markers that open a capture mode, plus the one-line morphology field.
    fn open_capture(&mut self, line: &str) -> bool {
        if extract::is_pronunciation_marker(line) {
            self.mode = CaptureMode::Pronunciation;
            return true;
        }
        if extract::is_syllable_marker(line) {
            self.mode = CaptureMode::Syllables;
            return true;
        }
        if let Some(morphology) = extract::morphology(line) {
            if let Some(meaning) = self.builder.current_meaning_mut() {
                meaning.set_morphology(morphology);
            }
            return true;
        }
        if extract::is_etymology_marker(line) {
            self.mode = CaptureMode::Etymology;
            return true;
        }
        if let Some(relation) = extract::related_marker(line) {
            self.mode = CaptureMode::Related(relation);
            return true;
        }
        false
    }

    fn definition(&mut self, line: &str) {
        let Some(kind) = extract::definition_line(line) else {
            self.list_introduced = false;
            return;
        };
        let text = match kind {
            DefinitionLine::NoDefinition => return,
            _ => self.cleaner.clean(line, self.title),
        };
        let list_introduced = self.list_introduced;
        let Some(meaning) = self.builder.current_meaning_mut() else {
            return;
        };

        match kind {
            DefinitionLine::SubBullet if list_introduced => meaning.push_glossa(&text),
            DefinitionLine::SubBullet => meaning.push_example(&text),
            DefinitionLine::Definition { introduces_list } => {
                meaning.push_glossa(&text);
                self.list_introduced = introduces_list;
            }
            DefinitionLine::NoDefinition => {}
        }
    }
}

/// Parse one page body.
pub fn parse_page(config: &ParserConfig, title: &str, body: &str) -> Option<Entry> {
    PageParser::new(config, title).parse(body)
}

/// [`parse_page`] with a failure boundary: a panic inside the line loop
/// becomes [`ExtractError::PageFailed`] naming the page.
pub fn parse_page_checked(config: &ParserConfig, title: &str, body: &str) -> Result<Option<Entry>> {
    guard_page(title, || parse_page(config, title, body))
}

/// Run `f`, turning a panic into [`ExtractError::PageFailed`] for `title`.
pub(crate) fn guard_page<T>(title: &str, f: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = panic_message(payload.as_ref());
        error!(title, %message, "page failed");
        ExtractError::PageFailed {
            title: title.to_string(),
            message,
        }
    })
}

/// Text of a panic payload from `panic!` or `std::thread::JoinHandle::join`.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
