//! TOML watch file: sites, their saved boards, and filters.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use super::{FilterAction, FilterField, FilterRule, FilterScope};
use crate::model::BoardRef;

#[derive(Debug, Error)]
pub enum WatchFileError {
    #[error("failed to read watch file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse watch file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("site {site}: invalid api_base {value}: {source}")]
    InvalidApiBase {
        site: String,
        value: String,
        #[source]
        source: url::ParseError,
    },
    #[error("duplicate site id: {0}")]
    DuplicateSite(String),
    #[error("filter {pattern}: invalid board reference '{value}' (expected site/code)")]
    InvalidBoardRef { pattern: String, value: String },
    #[error("filter {pattern}: unknown site '{site}'")]
    UnknownSite { pattern: String, site: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteEntry {
    pub id: String,
    pub api_base: String,
    #[serde(default)]
    pub boards: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FilterEntry {
    pub pattern: String,
    #[serde(default = "default_fields")]
    pub fields: Vec<FilterField>,
    #[serde(default)]
    pub boards: Vec<String>,
    #[serde(default)]
    pub all_boards: bool,
    #[serde(default = "default_action")]
    pub action: FilterAction,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_fields() -> Vec<FilterField> {
    vec![FilterField::Subject, FilterField::Comment]
}

fn default_action() -> FilterAction {
    FilterAction::Watch
}

fn default_enabled() -> bool {
    true
}

/// Parsed watch file.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchFile {
    #[serde(default)]
    pub sites: Vec<SiteEntry>,
    #[serde(default)]
    pub filters: Vec<FilterEntry>,
}

impl WatchFile {
    /// Read and validate a watch file from disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn load(path: &Path) -> Result<Self, WatchFileError> {
        let raw = std::fs::read_to_string(path).map_err(|source| WatchFileError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate a watch file from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or references are invalid.
    pub fn parse(raw: &str) -> Result<Self, WatchFileError> {
        let file: Self = toml::from_str(raw)?;
        file.validate()?;
        Ok(file)
    }

    fn validate(&self) -> Result<(), WatchFileError> {
        self.api_bases()?;
        for entry in self.filters.iter().filter(|entry| !entry.all_boards) {
            self.resolve_boards(entry)?;
        }
        Ok(())
    }

    /// API base URL per site id.
    ///
    /// # Errors
    ///
    /// Returns an error on a duplicate site id or an unparsable URL.
    pub fn api_bases(&self) -> Result<HashMap<String, Url>, WatchFileError> {
        let mut bases = HashMap::new();
        for site in &self.sites {
            let url = Url::parse(&site.api_base).map_err(|source| {
                WatchFileError::InvalidApiBase {
                    site: site.id.clone(),
                    value: site.api_base.clone(),
                    source,
                }
            })?;
            if bases.insert(site.id.clone(), url).is_some() {
                return Err(WatchFileError::DuplicateSite(site.id.clone()));
            }
        }
        Ok(bases)
    }

    /// Every saved board, grouped by site.
    #[must_use]
    pub fn saved_boards(&self) -> SavedBoards {
        SavedBoards::new(
            self.sites
                .iter()
                .map(|site| {
                    let boards = site
                        .boards
                        .iter()
                        .map(|code| BoardRef::new(&site.id, code.trim_matches('/')))
                        .collect();
                    (site.id.clone(), boards)
                })
                .collect(),
        )
    }

    /// Build filter rules from the `[[filters]]` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if a filter names a malformed board or an unknown site.
    pub fn filter_rules(&self) -> Result<Vec<FilterRule>, WatchFileError> {
        self.filters
            .iter()
            .map(|entry| {
                let scope = if entry.all_boards {
                    FilterScope::AllBoards
                } else {
                    FilterScope::Boards(self.resolve_boards(entry)?)
                };
                Ok::<_, WatchFileError>(FilterRule::new(
                    entry.pattern.clone(),
                    entry.fields.clone(),
                    scope,
                    entry.action,
                    entry.enabled,
                ))
            })
            .collect()
    }

    fn resolve_boards(&self, entry: &FilterEntry) -> Result<Vec<BoardRef>, WatchFileError> {
        entry
            .boards
            .iter()
            .map(|value| {
                let board =
                    BoardRef::parse(value).ok_or_else(|| WatchFileError::InvalidBoardRef {
                        pattern: entry.pattern.clone(),
                        value: value.clone(),
                    })?;
                if !self.sites.iter().any(|site| site.id == board.site) {
                    return Err(WatchFileError::UnknownSite {
                        pattern: entry.pattern.clone(),
                        site: board.site,
                    });
                }
                Ok(board)
            })
            .collect()
    }
}

/// Saved boards grouped by site.
#[derive(Debug, Clone, Default)]
pub struct SavedBoards {
    sites: Vec<(String, Vec<BoardRef>)>,
}

impl SavedBoards {
    #[must_use]
    pub fn new(sites: Vec<(String, Vec<BoardRef>)>) -> Self {
        Self { sites }
    }

    #[must_use]
    pub fn by_site(&self) -> &[(String, Vec<BoardRef>)] {
        &self.sites
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::Layer;

    use super::*;

    /// Counts WARN events.
    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: Subscriber> Layer<S> for WarnCounter {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    const SAMPLE: &str = r#"
[[sites]]
id = "4chan"
api_base = "https://a.4cdn.org"
boards = ["g", "/diy/"]

[[filters]]
pattern = "/rust/i"
boards = ["4chan/g"]

[[filters]]
pattern = "soldering"
fields = ["comment"]
all_boards = true
enabled = false

[[filters]]
pattern = "spam"
action = "hide"
"#;

    #[test]
    fn test_parse_sample() {
        let file = WatchFile::parse(SAMPLE).unwrap();

        let saved = file.saved_boards();
        assert_eq!(
            saved.by_site(),
            &[(
                "4chan".to_string(),
                vec![BoardRef::new("4chan", "g"), BoardRef::new("4chan", "diy")]
            )]
        );

        let rules = file.filter_rules().unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[0].fields, vec![FilterField::Subject, FilterField::Comment]);
        assert_eq!(rules[0].scope, FilterScope::Boards(vec![BoardRef::new("4chan", "g")]));
        assert!(rules[0].is_enabled_watch());
        assert_eq!(rules[1].scope, FilterScope::AllBoards);
        assert!(!rules[1].enabled);
        assert_eq!(rules[2].action, FilterAction::Hide);

        let bases = file.api_bases().unwrap();
        assert_eq!(bases["4chan"].as_str(), "https://a.4cdn.org/");
    }

    #[test]
    fn test_unknown_site_rejected() {
        let raw = r#"
[[filters]]
pattern = "x"
boards = ["lainchan/g"]
"#;
        assert!(matches!(
            WatchFile::parse(raw),
            Err(WatchFileError::UnknownSite { .. })
        ));
    }

    #[test]
    fn test_bad_board_ref_rejected() {
        let raw = r#"
[[sites]]
id = "4chan"
api_base = "https://a.4cdn.org"

[[filters]]
pattern = "x"
boards = ["g"]
"#;
        assert!(matches!(
            WatchFile::parse(raw),
            Err(WatchFileError::InvalidBoardRef { .. })
        ));
    }

    #[test]
    fn test_bad_api_base_rejected() {
        let raw = r#"
[[sites]]
id = "4chan"
api_base = "not a url"
"#;
        assert!(matches!(
            WatchFile::parse(raw),
            Err(WatchFileError::InvalidApiBase { .. })
        ));
    }

    #[test]
    fn test_duplicate_site_rejected() {
        let raw = r#"
[[sites]]
id = "4chan"
api_base = "https://a.4cdn.org"

[[sites]]
id = "4chan"
api_base = "https://b.4cdn.org"
"#;
        assert!(matches!(
            WatchFile::parse(raw),
            Err(WatchFileError::DuplicateSite(_))
        ));
    }

    #[test]
    fn test_invalid_pattern_warned_once_per_load() {
        let raw = r#"
[[sites]]
id = "4chan"
api_base = "https://a.4cdn.org"
boards = ["g"]

[[filters]]
pattern = "/(unclosed/"
boards = ["4chan/g"]
"#;
        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(Arc::clone(&warnings)));

        let rules = tracing::subscriber::with_default(subscriber, || {
            WatchFile::parse(raw).unwrap().filter_rules().unwrap()
        });

        assert!(!rules[0].is_valid());
        assert_eq!(warnings.load(Ordering::SeqCst), 1);
    }
}
