//! Page source: splits a MediaWiki XML dump into pages.
//!
//! The dump is never parsed as XML. Pages are cut out of a chunked byte
//! stream by their `<page>`/`</page>` markers and the few fields we need are
//! pulled out with regexes.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use bzip2::read::MultiBzDecoder;
use lazy_static::lazy_static;
use regex::Regex;

const CHUNK_SIZE: usize = 1024 * 1024;
const READ_BUFFER: usize = 256 * 1024;

/// Titles that are never lexical entries even though they live in ns 0.
pub const DEFAULT_SKIP_TITLES: &[&str] = &["Pagina principale", "Pagina principale/Categorie"];

lazy_static! {
    static ref TITLE_PATTERN: Regex = Regex::new(r"<title>([^<]*)</title>").unwrap();
    static ref NS_PATTERN: Regex = Regex::new(r"<ns>(\d+)</ns>").unwrap();
    static ref TEXT_PATTERN: Regex = Regex::new(r"(?s)<text[^>]*>(.*?)</text>").unwrap();
    static ref ENTITY: Regex = Regex::new(r"&(?:#x([0-9a-fA-F]+)|#([0-9]+)|(lt|gt|amp|quot|apos));").unwrap();
}

/// Open a dump, decompressing `.bz2` (including multistream) on the fly.
pub fn open_dump(path: &Path) -> std::io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let reader: Box<dyn BufRead + Send> = if path.to_string_lossy().ends_with(".bz2") {
        Box::new(BufReader::with_capacity(READ_BUFFER, MultiBzDecoder::new(file)))
    } else {
        Box::new(BufReader::with_capacity(READ_BUFFER, file))
    };
    Ok(reader)
}

/// Move the valid UTF-8 prefix of `pending` into `buffer`, keeping an
/// incomplete trailing sequence for the next chunk.
fn drain_utf8(pending: &mut Vec<u8>, buffer: &mut String) {
    match std::str::from_utf8(pending) {
        Ok(s) => {
            buffer.push_str(s);
            pending.clear();
        }
        Err(e) if e.error_len().is_none() => {
            let valid = e.valid_up_to();
            buffer.push_str(&String::from_utf8_lossy(&pending[..valid]));
            pending.drain(..valid);
        }
        Err(_) => {
            buffer.push_str(&String::from_utf8_lossy(pending));
            pending.clear();
        }
    }
}

/// Call `callback` with the XML of every `<page>` element, in order.
/// Scanning stops early when the callback returns false.
pub fn scan_pages(mut reader: impl Read, mut callback: impl FnMut(String) -> bool) -> std::io::Result<()> {
    let mut buffer = String::new();
    let mut pending: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];

    loop {
        let bytes_read = reader.read(&mut chunk)?;
        if bytes_read == 0 {
            break;
        }

        pending.extend_from_slice(&chunk[..bytes_read]);
        drain_utf8(&mut pending, &mut buffer);

        while let Some(start) = buffer.find("<page>") {
            if let Some(end_offset) = buffer[start..].find("</page>") {
                let end = start + end_offset + "</page>".len();
                let page_xml = buffer[start..end].to_string();
                buffer.drain(..end);

                if !callback(page_xml) {
                    return Ok(());
                }
            } else {
                buffer.drain(..start);
                break;
            }
        }

        // Keep only a tail long enough to hold a split "<page>" marker.
        if buffer.len() > 10 && !buffer.contains("<page>") {
            let mut cut = buffer.len() - 10;
            while !buffer.is_char_boundary(cut) {
                cut -= 1;
            }
            buffer.drain(..cut);
        }
    }

    Ok(())
}

/// Decode the XML entities a MediaWiki export uses.
pub fn decode_entities(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    ENTITY
        .replace_all(text, |cap: &regex::Captures| {
            let code = if let Some(hex) = cap.get(1) {
                u32::from_str_radix(hex.as_str(), 16).ok()
            } else if let Some(dec) = cap.get(2) {
                dec.as_str().parse::<u32>().ok()
            } else {
                None
            };
            if let Some(code) = code {
                return char::from_u32(code).map(String::from).unwrap_or_else(|| cap[0].to_string());
            }
            match &cap[3] {
                "lt" => "<",
                "gt" => ">",
                "amp" => "&",
                "quot" => "\"",
                _ => "'",
            }
            .to_string()
        })
        .into_owned()
}

/// A page that passed the title filters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub page_id: usize,
    pub title: String,
    /// `None` for an empty or self-closing `<text/>`.
    pub body: Option<String>,
}

/// Why a page was dropped before parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoTitle,
    /// Non-article namespace, namespaced title or skip-listed title.
    Special,
}

/// Title filters applied before a page reaches the parser.
#[derive(Debug, Clone)]
pub struct PageFilter {
    pub skip_titles: Vec<String>,
}

impl Default for PageFilter {
    fn default() -> Self {
        PageFilter {
            skip_titles: DEFAULT_SKIP_TITLES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PageFilter {
    pub fn with_extra_titles(mut self, titles: impl IntoIterator<Item = String>) -> Self {
        self.skip_titles.extend(titles);
        self
    }

    pub fn accepts(&self, title: &str) -> bool {
        !title.contains(':') && !self.skip_titles.iter().any(|t| t == title)
    }

    /// Pull title and body out of one `<page>` element.
    pub fn extract(&self, page_xml: &str, page_id: usize) -> Result<RawPage, SkipReason> {
        let title = TITLE_PATTERN
            .captures(page_xml)
            .map(|cap| decode_entities(cap[1].trim()))
            .filter(|t| !t.is_empty())
            .ok_or(SkipReason::NoTitle)?;

        if let Some(cap) = NS_PATTERN.captures(page_xml) {
            if &cap[1] != "0" {
                return Err(SkipReason::Special);
            }
        }

        if !self.accepts(&title) {
            return Err(SkipReason::Special);
        }

        let body = TEXT_PATTERN
            .captures(page_xml)
            .map(|cap| decode_entities(&cap[1]))
            .filter(|text| !text.trim().is_empty());

        Ok(RawPage { page_id, title, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn page(title: &str, ns: u32, text: &str) -> String {
        format!(
            "<page>\n<title>{title}</title>\n<ns>{ns}</ns>\n<revision>\n<text bytes=\"1\" xml:space=\"preserve\">{text}</text>\n</revision>\n</page>"
        )
    }

    #[test]
    fn scan_pages_splits_stream() {
        let xml = format!("<mediawiki>\n{}\n{}\n</mediawiki>", page("a", 0, "x"), page("b", 0, "y"));
        let mut pages = Vec::new();
        scan_pages(xml.as_bytes(), |p| {
            pages.push(p);
            true
        })
        .unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("<title>a</title>"));
        assert!(pages[1].contains("<title>b</title>"));
    }

    #[test]
    fn scan_pages_stops_on_false() {
        let xml = format!("{}{}{}", page("a", 0, "x"), page("b", 0, "y"), page("c", 0, "z"));
        let mut count = 0;
        scan_pages(xml.as_bytes(), |_| {
            count += 1;
            count < 2
        })
        .unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn scan_pages_keeps_multibyte_chars_across_reads() {
        // A reader that yields one byte at a time splits every multibyte char.
        struct Trickle<'a>(&'a [u8]);
        impl Read for Trickle<'_> {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let Some((&first, rest)) = self.0.split_first() else {
                    return Ok(0);
                };
                buf[0] = first;
                self.0 = rest;
                Ok(1)
            }
        }

        let xml = page("città", 0, "perché è così");
        let mut pages = Vec::new();
        scan_pages(Trickle(xml.as_bytes()), |p| {
            pages.push(p);
            true
        })
        .unwrap();
        assert_eq!(pages, vec![xml]);
    }

    #[test]
    fn decode_named_and_numeric_entities() {
        assert_eq!(decode_entities("&lt;ref&gt; &amp; &quot;x&quot; l&apos;acqua"), "<ref> & \"x\" l'acqua");
        assert_eq!(decode_entities("&#232; &#xE0;"), "è à");
        assert_eq!(decode_entities("&amp;lt;"), "&lt;");
        assert_eq!(decode_entities("&nbsp;"), "&nbsp;");
    }

    #[test]
    fn extract_article_page() {
        let filter = PageFilter::default();
        let raw = filter.extract(&page("casa", 0, "== {{-it-}} ==\n# &lt;b&gt;"), 7).unwrap();
        assert_eq!(raw.page_id, 7);
        assert_eq!(raw.title, "casa");
        assert_eq!(raw.body.as_deref(), Some("== {{-it-}} ==\n# <b>"));
    }

    #[test]
    fn extract_skips_special_pages() {
        let filter = PageFilter::default();
        assert_eq!(filter.extract(&page("casa", 10, "x"), 0), Err(SkipReason::Special));
        assert_eq!(filter.extract(&page("Categoria:Nomi", 0, "x"), 0), Err(SkipReason::Special));
        assert_eq!(filter.extract(&page("Pagina principale", 0, "x"), 0), Err(SkipReason::Special));
        assert_eq!(filter.extract("<page><ns>0</ns></page>", 0), Err(SkipReason::NoTitle));
    }

    #[test]
    fn extract_extra_skip_titles() {
        let filter = PageFilter::default().with_extra_titles(vec!["Sandbox".to_string()]);
        assert_eq!(filter.extract(&page("Sandbox", 0, "x"), 0), Err(SkipReason::Special));
    }

    #[test]
    fn extract_absent_body() {
        let filter = PageFilter::default();
        let xml = "<page><title>vuota</title><ns>0</ns><revision><text bytes=\"0\" /></revision></page>";
        assert_eq!(filter.extract(xml, 0).unwrap().body, None);
        assert_eq!(filter.extract(&page("vuota", 0, "  "), 0).unwrap().body, None);
    }
}
