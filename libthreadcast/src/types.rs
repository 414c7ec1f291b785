//! Core types for Threadcast

use serde::{Deserialize, Serialize};

/// Identifier of a published post, as assigned by the platform
///
/// Opaque to Threadcast; only used as the reply target of the next post.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PostId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered messages to publish as one reply chain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageBatch(Vec<String>);

impl MessageBatch {
    pub fn new(messages: Vec<String>) -> Self {
        Self(messages)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl From<Vec<String>> for MessageBatch {
    fn from(messages: Vec<String>) -> Self {
        Self(messages)
    }
}

impl<'a> IntoIterator for &'a MessageBatch {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Ids produced so far by a thread, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadReport {
    posts: Vec<PostId>,
}

impl ThreadReport {
    /// The post the next message should reply to
    pub fn last(&self) -> Option<&PostId> {
        self.posts.last()
    }

    pub fn push(&mut self, id: PostId) {
        self.posts.push(id);
    }

    pub fn into_posts(self) -> Vec<PostId> {
        self.posts
    }
}

/// A single session cookie held by a platform client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse the leading `name=value` pair of a `Set-Cookie` header
    ///
    /// Attributes after the first `;` are ignored.
    pub fn parse_set_cookie(header: &str) -> Option<Self> {
        let pair = header.split(';').next()?.trim();
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some(Self::new(name, value.trim().trim_matches('"')))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_id_display() {
        let id = PostId::new("1790000000000000000");
        assert_eq!(id.to_string(), "1790000000000000000");
        assert_eq!(id.as_str(), "1790000000000000000");
    }

    #[test]
    fn test_message_batch_serde_is_a_plain_array() {
        let batch: MessageBatch = serde_json::from_str(r#"["one", "two"]"#).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.iter().next().map(String::as_str), Some("one"));
        assert_eq!(serde_json::to_string(&batch).unwrap(), r#"["one","two"]"#);
    }

    #[test]
    fn test_parse_set_cookie() {
        let cookie =
            Cookie::parse_set_cookie("ct0=abc123; Max-Age=21600; Domain=.twitter.com; Secure")
                .unwrap();
        assert_eq!(cookie, Cookie::new("ct0", "abc123"));

        let cookie = Cookie::parse_set_cookie("auth_token=\"quoted\"").unwrap();
        assert_eq!(cookie.value, "quoted");

        // Deletion cookies have empty values but are still cookies
        let cookie = Cookie::parse_set_cookie("ct0=; Max-Age=0").unwrap();
        assert_eq!(cookie.value, "");
    }

    #[test]
    fn test_parse_set_cookie_rejects_garbage() {
        assert!(Cookie::parse_set_cookie("").is_none());
        assert!(Cookie::parse_set_cookie("novalue").is_none());
        assert!(Cookie::parse_set_cookie("=value").is_none());
    }
}
