//! Core value types shared by the stashtag pipeline.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "stashtag-core";

/// Date format accepted by the catalog for scene dates.
pub const CATALOG_DATE_FORMAT: &str = "%Y-%m-%d";

const LOCAL_DATE_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Lowercase hex SHA-256 of a file's content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid fingerprint {0:?}: expected 64 hex characters")]
pub struct InvalidFingerprint(pub String);

impl Fingerprint {
    pub const HEX_LEN: usize = 64;

    /// Wrap a finished SHA-256 digest.
    pub fn from_digest(digest: &[u8]) -> Self {
        Self(hex::encode(digest))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Fingerprint {
    type Err = InvalidFingerprint;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() == Self::HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            Ok(Self(s.to_ascii_lowercase()))
        } else {
            Err(InvalidFingerprint(s.to_string()))
        }
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = InvalidFingerprint;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Fingerprint> for String {
    fn from(value: Fingerprint) -> Self {
        value.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    Video,
    Other,
}

/// A post published on the metadata source, as returned by a hash search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    pub source_file_id: i64,
    pub external_id: String,
    pub user: String,
    pub service: String,
    pub title: String,
    /// Zoneless local date-time text, e.g. `2023-05-01T10:00:00`.
    pub published_at: String,
    pub description: String,
}

/// A scene stored in the catalog.
///
/// Empty strings from the catalog deserialize to `None`, so "absent" and "empty" are the same
/// state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    #[serde(deserialize_with = "de_scene_id")]
    pub id: i64,
    #[serde(default, deserialize_with = "de_non_empty")]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "de_non_empty")]
    pub details: Option<String>,
    #[serde(default, deserialize_with = "de_string_list")]
    pub urls: Vec<String>,
    #[serde(default, deserialize_with = "de_non_empty")]
    pub date: Option<String>,
}

impl CatalogEntry {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            title: None,
            details: None,
            urls: Vec::new(),
            date: None,
        }
    }

    /// Copy of this entry with the decision's assignments applied.
    pub fn with_decision(&self, decision: &MergeDecision) -> Self {
        let mut next = self.clone();
        if let Some(title) = &decision.title {
            next.title = Some(title.clone());
        }
        if let Some(details) = &decision.details {
            next.details = Some(details.clone());
        }
        if let Some(date) = &decision.date {
            next.date = Some(date.clone());
        }
        next
    }
}

/// Result of a path-pattern search in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSearch {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub filesize: f64,
    #[serde(default)]
    pub scenes: Vec<CatalogEntry>,
}

/// Field assignments to fill empty catalog fields. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeDecision {
    pub title: Option<String>,
    pub details: Option<String>,
    pub date: Option<String>,
}

impl MergeDecision {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.details.is_none() && self.date.is_none()
    }

    pub fn assigned_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.title.is_some() {
            fields.push("title");
        }
        if self.details.is_some() {
            fields.push("details");
        }
        if self.date.is_some() {
            fields.push("date");
        }
        fields
    }
}

/// Partial update sent to the catalog; `None` fields are omitted from the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SceneUpdate {
    #[serde(serialize_with = "ser_scene_id")]
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl SceneUpdate {
    pub fn from_decision(id: i64, decision: &MergeDecision) -> Self {
        Self {
            id,
            title: decision.title.clone(),
            details: decision.details.clone(),
            date: decision.date.clone(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unparseable publication timestamp {input:?}")]
pub struct DateParseError {
    pub input: String,
}

/// Convert a zoneless local date-time to the catalog's `YYYY-MM-DD` form.
///
/// Empty input yields an empty string.
pub fn normalize_date(input: &str) -> Result<String, DateParseError> {
    if input.is_empty() {
        return Ok(String::new());
    }
    // chrono skips whitespace before numeric fields; padded text is not a timestamp.
    let padded = input.trim() != input;
    LOCAL_DATE_TIME_FORMATS
        .iter()
        .filter(|_| !padded)
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|dt| dt.format(CATALOG_DATE_FORMAT).to_string())
        .ok_or_else(|| DateParseError {
            input: input.to_string(),
        })
}

fn de_non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()))
}

fn de_string_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Option<Vec<String>> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

// GraphQL IDs travel as strings; older servers send plain numbers.
fn de_scene_id<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Num(i64),
        Text(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Num(id) => Ok(id),
        RawId::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid scene id {text:?}"))),
    }
}

fn ser_scene_id<S>(id: &i64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(id)
}
