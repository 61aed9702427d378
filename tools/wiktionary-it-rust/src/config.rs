//! Lookup tables and configuration for the page parser.
//!
//! Everything the line parser consults besides the page itself lives in
//! [`ParserConfig`], built once before the run and shared read-only by every
//! page (and every worker thread).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use lazy_static::lazy_static;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{ExtractError, Result};

/// Language tag of the section we extract (`== {{-it-}} ==`).
pub const DEFAULT_TARGET_LANG: &str = "it";

/// Column headers of the language list TSV.
const LANG_CODE_COLUMN: &str = "Language Code";
const LANG_NAME_COLUMN: &str = "Language Name (Italian)";

lazy_static! {
    // Part-of-speech tags as they appear in the wild, mapped to the canonical tag.
    static ref TAG_ALIASES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("sostantivo", "sost");
        m.insert("nome", "sost");
        m.insert("sot", "sost");
        m.insert("sots", "sost");
        m.insert("aggettivo", "agg");
        m.insert("agg.", "agg");
        m.insert("aggg", "agg");
        m.insert("avverbio", "avv");
        m.insert("avv.", "avv");
        m.insert("verbo", "verb");
        m.insert("ver", "verb");
        m.insert("vebr", "verb");
        m.insert("preposizione", "prep");
        m.insert("congiunzione", "cong");
        m.insert("interiezione", "inter");
        m.insert("articolo", "art");
        m.insert("sost-form", "sost form");
        m.insert("agg-form", "agg form");
        m.insert("verb-form", "verb form");
        m
    };

    // Register and usage labels, keyed by lowercased template name.
    static ref REGISTER_LABELS: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("fig", "(senso figurato)");
        m.insert("est", "(per estensione)");
        m.insert("lett", "(letteralmente)");
        m.insert("spreg", "(spregiativo)");
        m.insert("raro", "(raro)");
        m.insert("pop", "(popolare)");
        m.insert("fam", "(familiare)");
        m.insert("gerg", "(gergale)");
        m.insert("volg", "(volgare)");
        m.insert("antiq", "(antiquato)");
        m.insert("disus", "(disusato)");
        m.insert("letter", "(letterario)");
        m.insert("poet", "(poetico)");
        m.insert("scherz", "(scherzoso)");
        m.insert("iperb", "(iperbolico)");
        m.insert("eufem", "(eufemistico)");
        m.insert("dial", "(dialettale)");
        m.insert("region", "(regionale)");
        m.insert("tecn", "(tecnico)");
        m.insert("burocr", "(burocratico)");
        m
    };

    // Fallback code→name table when no language list file is supplied.
    static ref LANG_NAMES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("it", "italiano");
        m.insert("la", "latino");
        m.insert("grc", "greco antico");
        m.insert("el", "greco");
        m.insert("fr", "francese");
        m.insert("en", "inglese");
        m.insert("de", "tedesco");
        m.insert("es", "spagnolo");
        m.insert("pt", "portoghese");
        m.insert("ar", "arabo");
        m.insert("he", "ebraico");
        m.insert("nl", "olandese");
        m.insert("ru", "russo");
        m.insert("ja", "giapponese");
        m.insert("zh", "cinese");
        m.insert("got", "gotico");
        m.insert("fro", "francese antico");
        m.insert("pro", "provenzale antico");
        m.insert("vec", "veneto");
        m.insert("nap", "napoletano");
        m.insert("scn", "siciliano");
        m
    };
}

fn to_owned_map(m: &HashMap<&'static str, &'static str>) -> HashMap<String, String> {
    m.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

/// Read-only lookup bundle passed to every page parse.
#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub target_lang: String,
    /// Language code → display name (`{{la}}` → `latino`).
    pub lang_names: HashMap<String, String>,
    /// Known typos and long forms of part-of-speech tags.
    pub tag_aliases: HashMap<String, String>,
    /// Register label template name → literal parenthetical text.
    pub register_labels: HashMap<String, String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            target_lang: DEFAULT_TARGET_LANG.to_string(),
            lang_names: to_owned_map(&LANG_NAMES),
            tag_aliases: to_owned_map(&TAG_ALIASES),
            register_labels: to_owned_map(&REGISTER_LABELS),
        }
    }
}

impl ParserConfig {
    /// Replace the code→name table wholesale.
    pub fn with_lang_names(mut self, lang_names: HashMap<String, String>) -> Self {
        self.lang_names = lang_names;
        self
    }

    pub fn with_target_lang(mut self, lang: impl Into<String>) -> Self {
        self.target_lang = lang.into();
        self
    }

    /// Canonical form of a part-of-speech tag: trimmed, then corrected through
    /// the alias table. Unknown tags pass through unchanged.
    pub fn canonical_tag(&self, tag: &str) -> String {
        let tag = tag.trim();
        self.tag_aliases
            .get(tag)
            .cloned()
            .unwrap_or_else(|| tag.to_string())
    }

    pub fn lang_name(&self, code: &str) -> Option<&str> {
        self.lang_names.get(code).map(String::as_str)
    }

    pub fn register_label(&self, template: &str) -> Option<&str> {
        self.register_labels
            .get(&template.to_lowercase())
            .map(String::as_str)
    }

    /// Apply the overrides of a config file on top of this bundle.
    ///
    /// The language table named by `langs` is loaded here, so a bad path
    /// fails before any page is read.
    pub fn merge_file(mut self, file: &ConfigFile) -> Result<Self> {
        if let Some(lang) = &file.target_lang {
            if lang.trim().is_empty() {
                return Err(ExtractError::Config("target_lang must not be empty".to_string()));
            }
            self.target_lang = lang.trim().to_string();
        }
        if let Some(path) = &file.langs {
            self.lang_names = load_lang_table(path)?;
        }
        self.tag_aliases
            .extend(file.tag_aliases.iter().map(|(k, v)| (k.clone(), v.clone())));
        self.register_labels.extend(
            file.register_labels
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone())),
        );
        Ok(self)
    }
}

/// Optional YAML configuration file.
///
/// ```yaml
/// target_lang: it
/// langs: data/lang_list.tsv
/// tag_aliases:
///   sostantivo: sost
/// register_labels:
///   fig: "(senso figurato)"
/// skip_titles:
///   - Pagina principale
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub target_lang: Option<String>,
    pub langs: Option<PathBuf>,
    pub tag_aliases: HashMap<String, String>,
    pub register_labels: HashMap<String, String>,
    pub skip_titles: Vec<String>,
}

impl ConfigFile {
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let file: ConfigFile = serde_yaml::from_str(&contents)?;
        Ok(file)
    }
}

/// Load the code→name table from a TSV (header row required) or a YAML map.
pub fn load_lang_table(path: &Path) -> Result<HashMap<String, String>> {
    let contents = fs::read_to_string(path)?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    let table = if is_yaml {
        serde_yaml::from_str(&contents)?
    } else {
        parse_lang_tsv(&contents, path)?
    };
    debug!("Loaded {} language names from {}", table.len(), path.display());
    Ok(table)
}

fn parse_lang_tsv(contents: &str, path: &Path) -> Result<HashMap<String, String>> {
    let mut lines = contents.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().ok_or_else(|| ExtractError::LangTable {
        path: path.to_path_buf(),
        reason: "empty file".to_string(),
    })?;

    let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
    if columns.len() < 2 {
        return Err(ExtractError::LangTable {
            path: path.to_path_buf(),
            reason: "expected at least two tab-separated columns".to_string(),
        });
    }
    let code_idx = columns.iter().position(|c| *c == LANG_CODE_COLUMN).unwrap_or(0);
    let name_idx = columns
        .iter()
        .position(|c| *c == LANG_NAME_COLUMN)
        .unwrap_or(if code_idx == 1 { 0 } else { 1 });

    let mut table = HashMap::new();
    for (n, line) in lines.enumerate() {
        let fields: Vec<&str> = line.split('\t').collect();
        match (fields.get(code_idx), fields.get(name_idx)) {
            (Some(code), Some(name)) if !code.trim().is_empty() => {
                table.insert(code.trim().to_string(), name.trim().to_string());
            }
            _ => warn!("{}: skipping malformed row {}", path.display(), n + 2),
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn canonical_tag_corrects_known_typos() {
        let config = ParserConfig::default();
        assert_eq!(config.canonical_tag("sostantivo"), "sost");
        assert_eq!(config.canonical_tag(" vebr "), "verb");
        assert_eq!(config.canonical_tag("sost"), "sost");
        assert_eq!(config.canonical_tag("nuovo"), "nuovo");
    }

    #[test]
    fn register_label_lookup_ignores_case() {
        let config = ParserConfig::default();
        assert_eq!(config.register_label("Fig"), Some("(senso figurato)"));
        assert_eq!(config.register_label("est"), Some("(per estensione)"));
        assert_eq!(config.register_label("Sconosciuto"), None);
    }

    #[test]
    fn tsv_columns_found_by_header_name() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Language Name (Italian)\tLanguage Code").unwrap();
        writeln!(file, "latino\tla").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "francese\tfr").unwrap();
        writeln!(file, "broken").unwrap();

        let table = load_lang_table(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table["la"], "latino");
        assert_eq!(table["fr"], "francese");
    }

    #[test]
    fn empty_tsv_is_an_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let err = load_lang_table(file.path()).unwrap_err();
        assert!(matches!(err, ExtractError::LangTable { .. }));
    }

    #[test]
    fn yaml_lang_table() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "la: latino\ngrc: greco antico").unwrap();
        let table = load_lang_table(file.path()).unwrap();
        assert_eq!(table["grc"], "greco antico");
    }

    #[test]
    fn config_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "target_lang: scn\ntag_aliases:\n  nomu: sost\nregister_labels:\n  Ant: \"(antico)\""
        )
        .unwrap();

        let cfg_file = ConfigFile::load(file.path()).unwrap();
        let config = ParserConfig::default().merge_file(&cfg_file).unwrap();
        assert_eq!(config.target_lang, "scn");
        assert_eq!(config.canonical_tag("nomu"), "sost");
        assert_eq!(config.canonical_tag("sostantivo"), "sost");
        assert_eq!(config.register_label("ant"), Some("(antico)"));
    }

    #[test]
    fn blank_target_lang_rejected() {
        let cfg_file = ConfigFile {
            target_lang: Some("  ".to_string()),
            ..ConfigFile::default()
        };
        assert!(ParserConfig::default().merge_file(&cfg_file).is_err());
    }
}
