//! XML-RPC value model.

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use pkgindex_core::{ReleaseDataValue, ReleaseUrl, SearchHit};

/// Any value that can appear in a call or response.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Bool(bool),
    String(String),
    Double(f64),
    DateTime(NaiveDateTime),
    Base64(Vec<u8>),
    Array(Vec<Value>),
    Struct(IndexMap<String, Value>),
    Nil,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness as installers send it: booleans, or ints where non-zero
    /// is true.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Struct(members) => Some(members),
            _ => None,
        }
    }

    /// Strings of a string or an array of strings.
    pub fn as_string_list(&self) -> Option<Vec<String>> {
        match self {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_str().map(str::to_string))
                .collect(),
            _ => None,
        }
    }

    /// Name of the XML-RPC type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Bool(_) => "boolean",
            Value::String(_) => "string",
            Value::Double(_) => "double",
            Value::DateTime(_) => "dateTime.iso8601",
            Value::Base64(_) => "base64",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Nil => "nil",
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(values: Vec<T>) -> Self {
        Value::Array(values.into_iter().map(Into::into).collect())
    }
}

impl From<ReleaseDataValue> for Value {
    fn from(value: ReleaseDataValue) -> Self {
        match value {
            ReleaseDataValue::Text(text) => Value::String(text),
            ReleaseDataValue::List(items) => items.into(),
        }
    }
}

impl From<ReleaseUrl> for Value {
    fn from(url: ReleaseUrl) -> Self {
        let members: [(&str, Value); 9] = [
            ("url", Value::String(url.url)),
            ("packagetype", Value::String(url.packagetype)),
            ("filename", Value::String(url.filename)),
            ("size", Value::Int(url.size)),
            ("md5_digest", Value::String(url.md5_digest)),
            ("downloads", Value::Int(url.downloads)),
            ("has_sig", Value::Bool(url.has_sig)),
            ("python_version", Value::String(url.python_version)),
            ("comment_text", Value::String(url.comment_text)),
        ];

        Value::Struct(
            members
                .into_iter()
                .map(|(key, value)| (key.to_string(), value))
                .collect(),
        )
    }
}

impl From<SearchHit> for Value {
    fn from(hit: SearchHit) -> Self {
        let members: IndexMap<String, Value> = [
            ("name", hit.name),
            ("version", hit.version),
            ("summary", hit.summary),
        ]
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::String(value)))
        .collect();

        Value::Struct(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_list() {
        assert_eq!(Value::from("a").as_string_list(), Some(vec!["a".to_string()]));
        assert_eq!(
            Value::from(vec!["a", "b"]).as_string_list(),
            Some(vec!["a".to_string(), "b".to_string()])
        );
        assert_eq!(Value::Array(vec![Value::Int(1)]).as_string_list(), None);
        assert_eq!(Value::Nil.as_string_list(), None);
    }

    #[test]
    fn test_int_truthiness() {
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::Int(2).as_bool(), Some(true));
        assert_eq!(Value::from("true").as_bool(), None);
    }

    #[test]
    fn test_release_url_member_order() {
        let url = ReleaseUrl {
            url: "http://host/packages/foo/foo-1.0.tar.gz".to_string(),
            packagetype: "sdist".to_string(),
            filename: "foo-1.0.tar.gz".to_string(),
            size: 3,
            md5_digest: String::new(),
            downloads: 0,
            has_sig: true,
            python_version: String::new(),
            comment_text: String::new(),
        };

        let value = Value::from(url);
        let members = value.as_struct().unwrap();

        assert_eq!(
            members.keys().map(String::as_str).collect::<Vec<_>>(),
            [
                "url",
                "packagetype",
                "filename",
                "size",
                "md5_digest",
                "downloads",
                "has_sig",
                "python_version",
                "comment_text"
            ]
        );
        assert_eq!(members["has_sig"], Value::Bool(true));
    }
}
