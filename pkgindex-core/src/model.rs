use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Authenticated identity performing a write.
///
/// Supplied by the authentication layer; `username` is the stable key used
/// for owner and maintainer comparisons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}

impl Actor {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            full_name: String::new(),
            email: String::new(),
        }
    }
}

/// Raw form fields of an inbound POST: every key maps to the values it was
/// sent with, in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields {
    fields: IndexMap<String, Vec<String>>,
}

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one value to `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.fields
            .entry(key.into())
            .or_default()
            .push(value.into());
    }

    /// Replace every value stored under `key`.
    pub fn set_list(&mut self, key: impl Into<String>, values: Vec<String>) {
        self.fields.insert(key.into(), values);
    }

    /// Last value sent for `key`, matching how form decoders resolve
    /// repeated single-valued fields.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    pub fn get_list(&self, key: &str) -> &[String] {
        self.fields.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for FormFields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = FormFields::new();
        for (key, value) in iter {
            fields.append(key, value);
        }
        fields
    }
}

/// File content received in the `content` part of an upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Client-supplied filename; only the basename is ever used.
    pub filename: String,
    pub data: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }

    /// Final path component of the client filename.
    pub fn basename(&self) -> &str {
        self.filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.filename)
    }
}
