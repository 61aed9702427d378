//! Italian Wiktionary dump extractor.
//!
//! Turns the wikitext of each page into one structured [`Entry`] per headword
//! (pronunciation, syllables, etymology, synonyms, antonyms and
//! part-of-speech scoped meanings) and collects them into a [`Lexicon`].

pub mod cleaner;
pub mod config;
pub mod dump;
pub mod error;
pub mod extract;
pub mod output;
pub mod parallel;
pub mod parser;
pub mod record;

pub use cleaner::Cleaner;
pub use config::{ConfigFile, ParserConfig};
pub use dump::PageFilter;
pub use error::{ExtractError, Result};
pub use parallel::{Extraction, FailurePolicy, ParallelConfig, RunOptions, Stats, Strategy};
pub use parser::{parse_page, parse_page_checked, PageParser};
pub use record::{Entry, EntryBuilder, Lexicon, Meaning, SlotKey};
