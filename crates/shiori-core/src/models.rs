//! Data models for the bookmark store
//!
//! Defines the records the engine reads and writes: Bookmark (with its
//! archived content inline), Tag, TagCount and Account.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A saved bookmark together with its archived content
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Bookmark {
    /// Assigned by the store on insert; ignored by `insert`
    pub id: i64,
    /// The URL, unique across the store
    pub url: String,
    /// Display title
    pub title: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub author: String,
    /// Estimated read time in minutes, lower bound
    #[serde(default)]
    pub min_read_time: u32,
    /// Estimated read time in minutes, upper bound
    #[serde(default)]
    pub max_read_time: u32,
    /// Last modification time; filled with the current time when unset
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    /// Archived plain-text content
    #[serde(default)]
    pub content: String,
    /// Archived HTML snapshot
    #[serde(default)]
    pub html: String,
    /// Tags, ordered by name when read back from the store
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Bookmark {
    /// Create a new, unsaved bookmark
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            ..Self::default()
        }
    }

    /// Set the archived text and HTML
    pub fn set_content(&mut self, content: impl Into<String>, html: impl Into<String>) {
        self.content = content.into();
        self.html = html.into();
    }

    /// Add a tag by name, unless one with the same name is already present
    pub fn add_tag(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.tags.iter().any(|t| t.name == name) {
            self.tags.push(Tag::new(name));
        }
    }

    /// Mark a tag for removal on the next update
    pub fn remove_tag(&mut self, name: &str) {
        if let Some(tag) = self.tags.iter_mut().find(|t| t.name == name) {
            tag.deleted = true;
        }
    }

    /// Names of the tags that are not marked for removal
    pub fn tag_names(&self) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| !t.deleted)
            .map(|t| t.name.as_str())
            .collect()
    }
}

/// A tag attached to a bookmark
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    /// Stored id; `None` for a tag that has not been resolved yet
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    /// Set by callers to detach this tag during an update
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl Tag {
    /// Create an unresolved tag
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            deleted: false,
        }
    }

    /// A tag loaded from storage
    pub fn stored(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            name: name.into(),
            deleted: false,
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A tag and the number of bookmarks carrying it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagCount {
    pub id: i64,
    pub name: String,
    pub bookmark_count: i64,
}

/// A login principal
///
/// Only the encoded password hash is ever held here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookmark_new() {
        let bookmark = Bookmark::new("https://example.com", "Example");
        assert_eq!(bookmark.id, 0);
        assert_eq!(bookmark.url, "https://example.com");
        assert_eq!(bookmark.title, "Example");
        assert!(bookmark.modified.is_none());
        assert!(bookmark.tags.is_empty());
    }

    #[test]
    fn test_bookmark_tags() {
        let mut bookmark = Bookmark::new("https://example.com", "Example");
        bookmark.add_tag("rust");
        bookmark.add_tag("programming");
        bookmark.add_tag("rust");
        assert_eq!(bookmark.tag_names(), vec!["rust", "programming"]);

        bookmark.remove_tag("rust");
        assert_eq!(bookmark.tags.len(), 2);
        assert!(bookmark.tags[0].deleted);
        assert_eq!(bookmark.tag_names(), vec!["programming"]);
    }

    #[test]
    fn test_tag_display() {
        let tag = Tag::stored(3, "rust");
        assert_eq!(format!("{}", tag), "rust");
        assert_eq!(tag.id, Some(3));
    }

    #[test]
    fn test_bookmark_deserialize_defaults() {
        let json = r#"{"id": 0, "url": "https://example.com", "title": "Example", "tags": [{"name": "go"}]}"#;
        let bookmark: Bookmark = serde_json::from_str(json).unwrap();
        assert_eq!(bookmark.min_read_time, 0);
        assert!(bookmark.modified.is_none());
        assert_eq!(bookmark.tags, vec![Tag::new("go")]);
    }

    #[test]
    fn test_account_serialization_hides_hash() {
        let account = Account {
            id: 1,
            username: "alice".to_string(),
            password_hash: "pbkdf2-sha256$1$c2FsdA==$aGFzaA==".to_string(),
        };
        let json = serde_json::to_string(&account).unwrap();
        assert!(json.contains("alice"));
        assert!(!json.contains("pbkdf2"));
    }
}
