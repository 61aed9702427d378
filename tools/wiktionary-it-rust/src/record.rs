//! Lexical records and the assembler that owns them while a page is parsed.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Key of the provisional slot created before any real tag is seen.
pub const PLACEHOLDER_KEY: &str = "unk";

/// Part-of-speech slot key: normalized tag plus the sequence index of the tag
/// block within its entry. Serialized as `"unk"` or `"<tag>_<index>"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SlotKey {
    Placeholder,
    Tag { tag: String, index: usize },
}

impl SlotKey {
    pub fn tag(tag: impl Into<String>, index: usize) -> Self {
        SlotKey::Tag { tag: tag.into(), index }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, SlotKey::Placeholder)
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotKey::Placeholder => f.write_str(PLACEHOLDER_KEY),
            SlotKey::Tag { tag, index } => write!(f, "{tag}_{index}"),
        }
    }
}

impl FromStr for SlotKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == PLACEHOLDER_KEY {
            return Ok(SlotKey::Placeholder);
        }
        let (tag, index) = s
            .rsplit_once('_')
            .ok_or_else(|| format!("slot key without index: {s:?}"))?;
        let index = index
            .parse::<usize>()
            .map_err(|_| format!("slot key with invalid index: {s:?}"))?;
        Ok(SlotKey::tag(tag, index))
    }
}

impl Serialize for SlotKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Append `text` to a newline-joined accumulator.
fn append_line(buf: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(text);
}

/// One part-of-speech scoped sub-record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meaning {
    pub morphology: String,
    pub glossa: String,
    pub examples: String,
}

impl Meaning {
    /// First value wins; returns false when the field was already set.
    pub fn set_morphology(&mut self, morphology: String) -> bool {
        if self.morphology.is_empty() {
            self.morphology = morphology;
            true
        } else {
            false
        }
    }

    pub fn push_glossa(&mut self, text: &str) {
        append_line(&mut self.glossa, text);
    }

    pub fn push_example(&mut self, text: &str) {
        append_line(&mut self.examples, text);
    }
}

/// Everything extracted for one headword.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub ipa: Vec<String>,
    pub syllables: Vec<String>,
    pub etymology: String,
    pub synonyms: Vec<String>,
    pub antonyms: Vec<String>,
    pub meanings: IndexMap<SlotKey, Meaning>,
}

impl Entry {
    pub fn push_etymology(&mut self, text: &str) {
        append_line(&mut self.etymology, text);
    }

    pub fn has_placeholder(&self) -> bool {
        self.meanings.contains_key(&SlotKey::Placeholder)
    }
}

/// Record Assembler for a single page.
///
/// The entry springs into existence when the target language heading is
/// matched. Slots are created only through [`EntryBuilder::ensure_placeholder`]
/// and [`EntryBuilder::open_slot`], which keep the placeholder and real tag
/// slots mutually exclusive.
#[derive(Debug, Default)]
pub struct EntryBuilder {
    entry: Option<Entry>,
    current: Option<SlotKey>,
    next_index: usize,
}

impl EntryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the entry. A second target-language heading on the same page
    /// keeps the record built so far.
    pub fn start_entry(&mut self) {
        if self.entry.is_none() {
            self.entry = Some(Entry::default());
        }
    }

    pub fn has_entry(&self) -> bool {
        self.entry.is_some()
    }

    pub fn current_slot(&self) -> Option<&SlotKey> {
        self.current.as_ref()
    }

    /// Key the next tag block would receive.
    pub fn slot_key_for(&self, tag: &str) -> SlotKey {
        SlotKey::tag(tag, self.next_index)
    }

    /// Create the provisional `"unk"` slot if no slot exists yet.
    pub fn ensure_placeholder(&mut self) {
        let Some(entry) = self.entry.as_mut() else {
            return;
        };
        if self.current.is_none() {
            entry.meanings.insert(SlotKey::Placeholder, Meaning::default());
            self.current = Some(SlotKey::Placeholder);
        }
    }

    /// Start a new tag block. Returns false (and changes nothing) when the key
    /// equals the current slot or there is no entry.
    pub fn open_slot(&mut self, tag: &str) -> bool {
        let key = self.slot_key_for(tag);
        if self.current.as_ref() == Some(&key) {
            return false;
        }
        let Some(entry) = self.entry.as_mut() else {
            return false;
        };
        entry.meanings.shift_remove(&SlotKey::Placeholder);
        entry.meanings.insert(key.clone(), Meaning::default());
        self.current = Some(key);
        self.next_index += 1;
        true
    }

    pub fn entry_mut(&mut self) -> Option<&mut Entry> {
        self.entry.as_mut()
    }

    pub fn current_meaning_mut(&mut self) -> Option<&mut Meaning> {
        let key = self.current.as_ref()?;
        self.entry.as_mut()?.meanings.get_mut(key)
    }

    pub fn finish(self) -> Option<Entry> {
        self.entry
    }
}

/// The aggregate output: title → entry, in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Lexicon {
    entries: IndexMap<String, Entry>,
}

impl Lexicon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace; a repeated title overwrites the earlier entry and
    /// the previous value is returned.
    pub fn insert(&mut self, title: String, entry: Entry) -> Option<Entry> {
        self.entries.insert(title, entry)
    }

    pub fn get(&self, title: &str) -> Option<&Entry> {
        self.entries.get(title)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Entry)> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn slot_key_display_and_parse() {
        assert_eq!(SlotKey::Placeholder.to_string(), "unk");
        assert_eq!(SlotKey::tag("sost", 0).to_string(), "sost_0");
        assert_eq!("agg form_3".parse::<SlotKey>().unwrap(), SlotKey::tag("agg form", 3));
        assert_eq!("loc_nom_1".parse::<SlotKey>().unwrap(), SlotKey::tag("loc_nom", 1));
        assert!("sost".parse::<SlotKey>().is_err());
        assert!("sost_x".parse::<SlotKey>().is_err());
    }

    #[test]
    fn meaning_morphology_first_wins() {
        let mut m = Meaning::default();
        assert!(m.set_morphology("fsing".to_string()));
        assert!(!m.set_morphology("mpl".to_string()));
        assert_eq!(m.morphology, "fsing");
    }

    #[test]
    fn accumulators_join_with_newlines() {
        let mut m = Meaning::default();
        m.push_glossa("prima");
        m.push_glossa("");
        m.push_glossa("seconda");
        m.push_example("esempio");
        assert_eq!(m.glossa, "prima\nseconda");
        assert_eq!(m.examples, "esempio");
    }

    #[test]
    fn placeholder_removed_on_first_real_slot() {
        let mut b = EntryBuilder::new();
        b.start_entry();
        b.ensure_placeholder();
        assert!(b.entry_mut().unwrap().has_placeholder());

        assert!(b.open_slot("sost"));
        let entry = b.finish().unwrap();
        assert!(!entry.has_placeholder());
        assert_eq!(entry.meanings.keys().collect::<Vec<_>>(), vec![&SlotKey::tag("sost", 0)]);
    }

    #[test]
    fn repeated_tag_gets_a_new_index() {
        let mut b = EntryBuilder::new();
        b.start_entry();
        b.ensure_placeholder();
        assert!(b.open_slot("sost"));
        assert!(b.open_slot("agg"));
        assert!(b.open_slot("sost"));

        let keys: Vec<String> = b.finish().unwrap().meanings.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["sost_0", "agg_1", "sost_2"]);
    }

    #[test]
    fn placeholder_not_recreated_after_real_slot() {
        let mut b = EntryBuilder::new();
        b.start_entry();
        b.open_slot("verb");
        b.ensure_placeholder();
        assert!(!b.finish().unwrap().has_placeholder());
    }

    #[test]
    fn no_slots_without_entry() {
        let mut b = EntryBuilder::new();
        b.ensure_placeholder();
        assert!(!b.open_slot("sost"));
        assert!(b.current_meaning_mut().is_none());
        assert!(b.finish().is_none());
    }

    #[test]
    fn lexicon_duplicate_title_replaces() {
        let mut lex = Lexicon::new();
        let first = Entry { etymology: "vecchia".to_string(), ..Entry::default() };
        let second = Entry { etymology: "nuova".to_string(), ..Entry::default() };
        assert!(lex.insert("casa".to_string(), first).is_none());
        assert!(lex.insert("casa".to_string(), second).is_some());
        assert_eq!(lex.len(), 1);
        assert_eq!(lex.get("casa").unwrap().etymology, "nuova");
    }

    #[test]
    fn entry_serializes_slot_keys_as_strings() {
        let mut entry = Entry::default();
        entry.meanings.insert(SlotKey::tag("sost", 0), Meaning::default());
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json["meanings"]["sost_0"].is_object());
        let back: Entry = serde_json::from_value(json).unwrap();
        assert_eq!(back, entry);
    }
}
