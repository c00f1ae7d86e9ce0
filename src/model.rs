//! Board, thread and post types shared by the filter engine, the catalog
//! fetcher and the watch coordinator.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A board within a site, e.g. `4chan/g`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoardRef {
    pub site: String,
    pub code: String,
}

impl BoardRef {
    #[must_use]
    pub fn new(site: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            code: code.into(),
        }
    }

    /// Parse a `site/code` reference. Returns `None` if either half is empty.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (site, code) = value.trim().split_once('/')?;
        let code = code.trim_matches('/');
        if site.is_empty() || code.is_empty() || code.contains('/') {
            return None;
        }
        Some(Self::new(site, code))
    }
}

impl fmt::Display for BoardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.site, self.code)
    }
}

/// A thread, identified by its board and OP number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadRef {
    pub board: BoardRef,
    pub op_no: u64,
}

impl fmt::Display for ThreadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/thread/{}", self.board, self.op_no)
    }
}

/// How a pinned thread is watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinType {
    /// Watch the thread for new posts.
    WatchNewPosts,
}

impl PinType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WatchNewPosts => "watch_new_posts",
        }
    }
}

/// A post as seen in one catalog load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostSnapshot {
    pub no: u64,
    /// OP number of the thread this post belongs to.
    pub op_no: u64,
    pub is_op: bool,
    /// Whether this post may trigger a watch pin.
    pub filter_watch: bool,
    pub subject: Option<String>,
    /// Comment body as plain text.
    pub comment: Option<String>,
    pub name: Option<String>,
    pub tripcode: Option<String>,
    pub poster_id: Option<String>,
    pub filename: Option<String>,
}

impl PostSnapshot {
    /// An OP post that is eligible for filter watching.
    #[must_use]
    pub fn op(no: u64) -> Self {
        Self {
            no,
            op_no: no,
            is_op: true,
            filter_watch: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn thread(&self, board: &BoardRef) -> ThreadRef {
        ThreadRef {
            board: board.clone(),
            op_no: self.op_no,
        }
    }
}

/// All posts returned by one catalog load of a board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSnapshot {
    pub board: BoardRef,
    pub posts: Vec<PostSnapshot>,
}

impl CatalogSnapshot {
    #[must_use]
    pub fn new(board: BoardRef, posts: Vec<PostSnapshot>) -> Self {
        Self { board, posts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_board_ref() {
        assert_eq!(BoardRef::parse("4chan/g"), Some(BoardRef::new("4chan", "g")));
        assert_eq!(BoardRef::parse(" 4chan/g/ "), Some(BoardRef::new("4chan", "g")));
        assert_eq!(BoardRef::parse("g"), None);
        assert_eq!(BoardRef::parse("/g"), None);
        assert_eq!(BoardRef::parse("4chan/"), None);
        assert_eq!(BoardRef::parse("4chan/g/extra"), None);
    }

    #[test]
    fn test_display() {
        let board = BoardRef::new("4chan", "diy");
        assert_eq!(board.to_string(), "4chan/diy");
        let thread = PostSnapshot::op(42).thread(&board);
        assert_eq!(thread.to_string(), "4chan/diy/thread/42");
    }
}
