//! Request body extraction for `POST /send-tweet`
//!
//! Callers send the batch either as JSON (`{"messages": ["a", "b"]}`) or as
//! a URL-encoded form. Forms may repeat the key (`messages=a&messages=b`),
//! use the bracket suffix (`messages[]=a`) or give explicit positions
//! (`messages[0]=a&messages[1]=b`).

use axum::extract::{FromRequest, Request};
use axum::http::header::CONTENT_TYPE;
use axum::{Form, Json};
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::app::ApiError;

const FIELD: &str = "messages";

/// The ordered batch of messages from the request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagesBody(pub Vec<String>);

#[derive(Debug, Deserialize)]
struct JsonBody {
    messages: Vec<String>,
}

impl<S> FromRequest<S> for MessagesBody
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| {
                v.to_ascii_lowercase()
                    .starts_with("application/x-www-form-urlencoded")
            });

        if is_form {
            let Form(pairs) = Form::<Vec<(String, String)>>::from_request(req, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;
            return from_form_pairs(pairs).map(MessagesBody);
        }

        let Json(body) = Json::<JsonBody>::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        Ok(MessagesBody(body.messages))
    }
}

/// Position of a form key within the batch
enum FormKey {
    Appended,
    Indexed(usize),
}

fn parse_form_key(key: &str) -> Option<FormKey> {
    let rest = key.strip_prefix(FIELD)?;
    if rest.is_empty() || rest == "[]" {
        return Some(FormKey::Appended);
    }
    rest.strip_prefix('[')?
        .strip_suffix(']')?
        .parse()
        .ok()
        .map(FormKey::Indexed)
}

fn from_form_pairs(pairs: Vec<(String, String)>) -> Result<Vec<String>, ApiError> {
    let mut appended = Vec::new();
    let mut indexed = BTreeMap::new();
    let mut seen = false;

    for (key, value) in pairs {
        match parse_form_key(&key) {
            Some(FormKey::Appended) => appended.push(value),
            Some(FormKey::Indexed(position)) => {
                if indexed.insert(position, value).is_some() {
                    return Err(ApiError::bad_request(format!(
                        "Duplicate form field `{}[{}]`",
                        FIELD, position
                    )));
                }
            }
            None => continue,
        }
        seen = true;
    }

    if !seen {
        return Err(ApiError::bad_request(format!("Missing field `{}`", FIELD)));
    }
    if !appended.is_empty() && !indexed.is_empty() {
        return Err(ApiError::bad_request(format!(
            "Cannot mix indexed and unindexed `{}` fields",
            FIELD
        )));
    }

    if indexed.is_empty() {
        Ok(appended)
    } else {
        Ok(indexed.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_repeated_keys_keep_order() {
        let messages =
            from_form_pairs(pairs(&[("messages", "one"), ("messages", "two")])).unwrap();
        assert_eq!(messages, vec!["one", "two"]);

        let messages =
            from_form_pairs(pairs(&[("messages[]", "one"), ("messages[]", "two")])).unwrap();
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[test]
    fn test_indexed_keys_sort_by_position() {
        let messages = from_form_pairs(pairs(&[
            ("messages[10]", "third"),
            ("messages[2]", "second"),
            ("messages[0]", "first"),
        ]))
        .unwrap();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unrelated_keys_are_ignored() {
        let messages =
            from_form_pairs(pairs(&[("other", "x"), ("messages", "kept"), ("messagesx", "y")]))
                .unwrap();
        assert_eq!(messages, vec!["kept"]);
    }

    #[test]
    fn test_form_errors() {
        let err = from_form_pairs(pairs(&[("other", "x")])).unwrap_err();
        assert!(err.message().contains("Missing field"));

        let err =
            from_form_pairs(pairs(&[("messages[0]", "a"), ("messages", "b")])).unwrap_err();
        assert!(err.message().contains("mix"));

        let err =
            from_form_pairs(pairs(&[("messages[1]", "a"), ("messages[1]", "b")])).unwrap_err();
        assert!(err.message().contains("Duplicate"));
    }

    #[test]
    fn test_parse_form_key() {
        assert!(matches!(parse_form_key("messages"), Some(FormKey::Appended)));
        assert!(matches!(parse_form_key("messages[]"), Some(FormKey::Appended)));
        assert!(matches!(parse_form_key("messages[3]"), Some(FormKey::Indexed(3))));
        assert!(parse_form_key("messages[x]").is_none());
        assert!(parse_form_key("messages[-1]").is_none());
        assert!(parse_form_key("message").is_none());
    }
}
