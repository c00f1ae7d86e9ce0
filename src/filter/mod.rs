//! Watch filter rules and the engine that evaluates them against posts.

pub mod pattern;
pub mod watch_file;

pub use watch_file::{SavedBoards, WatchFile, WatchFileError};

use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::model::{BoardRef, PostSnapshot};

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("filter pattern is empty")]
    EmptyPattern,
    #[error("unknown regex flag '{flag}' in pattern {pattern}")]
    UnknownFlag { pattern: String, flag: char },
    #[error("invalid regex in pattern {pattern}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Post field a filter pattern is tested against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterField {
    Subject,
    Comment,
    Name,
    Tripcode,
    PosterId,
    Filename,
}

impl FilterField {
    fn value(self, post: &PostSnapshot) -> Option<&str> {
        match self {
            Self::Subject => post.subject.as_deref(),
            Self::Comment => post.comment.as_deref(),
            Self::Name => post.name.as_deref(),
            Self::Tripcode => post.tripcode.as_deref(),
            Self::PosterId => post.poster_id.as_deref(),
            Self::Filename => post.filename.as_deref(),
        }
    }
}

/// What happens to a post when a filter matches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    Hide,
    Highlight,
    Remove,
    /// Pin the post's thread and watch it for new posts.
    Watch,
}

/// Boards a filter applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterScope {
    AllBoards,
    Boards(Vec<BoardRef>),
}

/// A user-defined filter.
#[derive(Debug, Clone)]
pub struct FilterRule {
    pub pattern: String,
    pub fields: Vec<FilterField>,
    pub scope: FilterScope,
    pub action: FilterAction,
    pub enabled: bool,
    /// `None` when `pattern` failed to compile; such a rule never matches.
    compiled: Option<Regex>,
}

impl FilterRule {
    /// Build a rule, compiling its pattern. A pattern that fails to compile is
    /// logged and produces a rule that never matches.
    #[must_use]
    pub fn new(
        pattern: impl Into<String>,
        fields: Vec<FilterField>,
        scope: FilterScope,
        action: FilterAction,
        enabled: bool,
    ) -> Self {
        let pattern = pattern.into();
        let compiled = match pattern::compile(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                warn!(pattern = %pattern, "Filter disabled: {e}");
                None
            }
        };
        Self {
            pattern,
            fields,
            scope,
            action,
            enabled,
            compiled,
        }
    }

    /// An enabled watch rule, mostly for tests and examples.
    #[must_use]
    pub fn watch(pattern: &str, fields: Vec<FilterField>, scope: FilterScope) -> Self {
        Self::new(pattern, fields, scope, FilterAction::Watch, true)
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.compiled.is_some()
    }

    #[must_use]
    pub fn is_enabled_watch(&self) -> bool {
        self.enabled && self.action == FilterAction::Watch
    }

    /// Whether the pattern matches any of the rule's non-empty fields.
    #[must_use]
    pub fn matches(&self, post: &PostSnapshot) -> bool {
        let Some(re) = &self.compiled else {
            return false;
        };
        self.fields
            .iter()
            .filter_map(|field| field.value(post))
            .filter(|value| !value.is_empty())
            .any(|value| re.is_match(value))
    }
}

/// Holds the current rule set. Reads are lock-light and the set can be
/// swapped wholesale when the watch file is reloaded.
#[derive(Debug, Default)]
pub struct FilterEngine {
    rules: RwLock<Arc<Vec<FilterRule>>>,
}

impl FilterEngine {
    #[must_use]
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self {
            rules: RwLock::new(Arc::new(rules)),
        }
    }

    /// Replace every rule.
    pub fn replace(&self, rules: Vec<FilterRule>) {
        *self.rules.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(rules);
    }

    fn snapshot(&self) -> Arc<Vec<FilterRule>> {
        Arc::clone(&self.rules.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Enabled rules whose action is [`FilterAction::Watch`], in declaration order.
    #[must_use]
    pub fn enabled_watch_filters(&self) -> Vec<FilterRule> {
        self.snapshot()
            .iter()
            .filter(|rule| rule.is_enabled_watch())
            .cloned()
            .collect()
    }

    /// Pure predicate evaluation, safe to call from any task.
    #[must_use]
    pub fn matches(rule: &FilterRule, post: &PostSnapshot) -> bool {
        rule.matches(post)
    }

    /// Boards targeted by `filters`, usually a snapshot taken with
    /// [`FilterEngine::enabled_watch_filters`].
    ///
    /// A rule scoped to all boards short-circuits to every saved board.
    /// The result is deduplicated and keeps first-seen order.
    #[must_use]
    pub fn watched_boards(
        filters: &[FilterRule],
        all_boards: impl FnOnce() -> Vec<BoardRef>,
    ) -> Vec<BoardRef> {
        if filters.iter().any(|rule| rule.scope == FilterScope::AllBoards) {
            return dedup(all_boards());
        }

        dedup(
            filters
                .iter()
                .filter_map(|rule| match &rule.scope {
                    FilterScope::Boards(boards) => Some(boards.iter().cloned()),
                    FilterScope::AllBoards => None,
                })
                .flatten()
                .collect(),
        )
    }
}

fn dedup(boards: Vec<BoardRef>) -> Vec<BoardRef> {
    let mut seen = HashSet::new();
    boards
        .into_iter()
        .filter(|board| seen.insert(board.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g() -> BoardRef {
        BoardRef::new("4chan", "g")
    }

    fn post_with_subject(no: u64, subject: &str) -> PostSnapshot {
        PostSnapshot {
            subject: Some(subject.to_string()),
            ..PostSnapshot::op(no)
        }
    }

    #[test]
    fn test_matches_selected_fields_only() {
        let rule = FilterRule::watch(
            "rust",
            vec![FilterField::Comment],
            FilterScope::Boards(vec![g()]),
        );
        let post = post_with_subject(1, "Rust general");
        assert!(!rule.matches(&post));

        let post = PostSnapshot {
            comment: Some("anyone using rust?".to_string()),
            ..post
        };
        assert!(rule.matches(&post));
        assert!(FilterEngine::matches(&rule, &post));
    }

    #[test]
    fn test_invalid_rule_never_matches() {
        let rule = FilterRule::watch(
            "/(broken/",
            vec![FilterField::Subject],
            FilterScope::AllBoards,
        );
        assert!(!rule.is_valid());
        assert!(!rule.matches(&post_with_subject(1, "(broken")));
    }

    #[test]
    fn test_enabled_watch_filters() {
        let engine = FilterEngine::new(vec![
            FilterRule::watch("a", vec![FilterField::Subject], FilterScope::AllBoards),
            FilterRule::new(
                "b",
                vec![FilterField::Subject],
                FilterScope::AllBoards,
                FilterAction::Watch,
                false,
            ),
            FilterRule::new(
                "c",
                vec![FilterField::Subject],
                FilterScope::AllBoards,
                FilterAction::Hide,
                true,
            ),
            FilterRule::watch("d", vec![FilterField::Subject], FilterScope::AllBoards),
        ]);

        let patterns: Vec<_> = engine
            .enabled_watch_filters()
            .into_iter()
            .map(|rule| rule.pattern)
            .collect();
        assert_eq!(patterns, vec!["a", "d"]);
    }

    #[test]
    fn test_watched_boards_union() {
        let diy = BoardRef::new("4chan", "diy");
        let engine = FilterEngine::new(vec![
            FilterRule::watch("a", vec![], FilterScope::Boards(vec![g(), diy.clone()])),
            FilterRule::watch("b", vec![], FilterScope::Boards(vec![diy.clone()])),
        ]);

        let boards = FilterEngine::watched_boards(&engine.enabled_watch_filters(), || {
            panic!("saved boards should not be listed")
        });
        assert_eq!(boards, vec![g(), diy]);
    }

    #[test]
    fn test_watched_boards_all_boards_short_circuits() {
        let engine = FilterEngine::new(vec![
            FilterRule::watch("a", vec![], FilterScope::Boards(vec![g()])),
            FilterRule::watch("b", vec![], FilterScope::AllBoards),
        ]);

        let saved = vec![BoardRef::new("4chan", "a"), BoardRef::new("4chan", "a")];
        assert_eq!(
            FilterEngine::watched_boards(&engine.enabled_watch_filters(), || saved),
            vec![BoardRef::new("4chan", "a")]
        );
    }

    #[test]
    fn test_disabled_all_boards_rule_is_ignored() {
        let engine = FilterEngine::new(vec![FilterRule::new(
            "a",
            vec![],
            FilterScope::AllBoards,
            FilterAction::Watch,
            false,
        )]);
        assert!(
            FilterEngine::watched_boards(&engine.enabled_watch_filters(), || vec![g()]).is_empty()
        );
    }

    #[test]
    fn test_replace() {
        let engine = FilterEngine::default();
        assert!(engine.enabled_watch_filters().is_empty());
        engine.replace(vec![FilterRule::watch("a", vec![], FilterScope::AllBoards)]);
        assert_eq!(engine.enabled_watch_filters().len(), 1);
    }
}
