//! Core data models used throughout Harble.
//!
//! These types represent the environments being watched, the revisions they
//! report, the builds fetched for those revisions, and the catalogs and state
//! records persisted to disk.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::MonitorError;

/// Identifier reserved for "no such message in this build". Never cached.
pub const ABSENT_ID: u16 = u16::MAX;

const MAX_REVISION_LEN: usize = 128;

/// A monitored hotel deployment.
///
/// The set is closed: there is no "unknown" member to filter out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Environment {
    Com,
    ComBr,
    ComTr,
    De,
    Es,
    Fi,
    Fr,
    It,
    Nl,
}

impl Environment {
    /// Every environment, in monitoring order.
    pub const ALL: [Environment; 9] = [
        Environment::Com,
        Environment::ComBr,
        Environment::ComTr,
        Environment::De,
        Environment::Es,
        Environment::Fi,
        Environment::Fr,
        Environment::It,
        Environment::Nl,
    ];

    /// Config-friendly name, e.g. `"com-br"`.
    pub fn slug(&self) -> &'static str {
        match self {
            Environment::Com => "com",
            Environment::ComBr => "com-br",
            Environment::ComTr => "com-tr",
            Environment::De => "de",
            Environment::Es => "es",
            Environment::Fi => "fi",
            Environment::Fr => "fr",
            Environment::It => "it",
            Environment::Nl => "nl",
        }
    }

    /// Domain suffix used in URLs and in the state file, e.g. `".com.br"`.
    pub fn domain(&self) -> &'static str {
        match self {
            Environment::Com => ".com",
            Environment::ComBr => ".com.br",
            Environment::ComTr => ".com.tr",
            Environment::De => ".de",
            Environment::Es => ".es",
            Environment::Fi => ".fi",
            Environment::Fr => ".fr",
            Environment::It => ".it",
            Environment::Nl => ".nl",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.domain())
    }
}

impl FromStr for Environment {
    type Err = String;

    /// Accepts either the slug (`com-br`) or the domain (`.com.br`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        Environment::ALL
            .into_iter()
            .find(|env| env.slug() == needle || env.domain() == needle)
            .ok_or_else(|| format!("unknown environment: '{}'", s))
    }
}

impl TryFrom<String> for Environment {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Environment> for String {
    fn from(env: Environment) -> Self {
        env.domain().to_string()
    }
}

/// Opaque build identifier. Comparable by equality only.
///
/// Validated on construction so that it can name a cache file directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(String);

impl Revision {
    pub fn new(value: impl Into<String>) -> Result<Self, MonitorError> {
        let value = value.into();
        if value.is_empty() || value.len() > MAX_REVISION_LEN {
            return Err(MonitorError::Fetch(format!(
                "revision must be 1..={} bytes, got {}",
                MAX_REVISION_LEN,
                value.len()
            )));
        }
        if value.starts_with('.')
            || !value
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(MonitorError::Fetch(format!(
                "revision contains unsupported characters: '{}'",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Revision {
    type Error = MonitorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Revision::new(value)
    }
}

impl From<Revision> for String {
    fn from(revision: Revision) -> Self {
        revision.0
    }
}

/// Protocol direction of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Incoming,
    Outgoing,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Incoming => f.write_str("incoming"),
            Direction::Outgoing => f.write_str("outgoing"),
        }
    }
}

/// One message definition extracted from a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CatalogEntry {
    pub name: String,
    pub hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structure: Option<Vec<String>>,
}

/// Message identifier → entry, for one direction. Sorted for stable output.
pub type Catalog = BTreeMap<u16, CatalogEntry>;

/// The cached extraction result for one revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CachedArtifact {
    pub revision: Revision,
    pub file_length: u64,
    pub incoming: Catalog,
    pub outgoing: Catalog,
}

/// What one environment reported at the last check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LastCheckedRecord {
    pub hotel: Environment,
    pub revision: Revision,
    pub last_checked: DateTime<Utc>,
}

/// A message class as it appears in a build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDefinition {
    #[serde(default)]
    pub structure: Vec<String>,
}

/// A fetched build, already decoded into its message tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Build {
    pub revision: Option<Revision>,
    pub file_length: u64,
    /// Content hash → identifier, for messages the client receives.
    #[serde(default)]
    pub incoming: BTreeMap<String, u16>,
    /// Content hash → identifier, for messages the client sends.
    #[serde(default)]
    pub outgoing: BTreeMap<String, u16>,
    /// Content hash → definitions sharing that hash.
    #[serde(default)]
    pub messages: HashMap<String, Vec<MessageDefinition>>,
}

impl Build {
    pub fn identifiers(&self, direction: Direction) -> &BTreeMap<String, u16> {
        match direction {
            Direction::Incoming => &self.incoming,
            Direction::Outgoing => &self.outgoing,
        }
    }

    /// First definition registered under `hash`, if any.
    pub fn definition(&self, hash: &str) -> Option<&MessageDefinition> {
        self.messages.get(hash).and_then(|defs| defs.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_slug_and_domain() {
        assert_eq!("com-br".parse::<Environment>().unwrap(), Environment::ComBr);
        assert_eq!(".com.tr".parse::<Environment>().unwrap(), Environment::ComTr);
        assert_eq!("NL".parse::<Environment>().unwrap(), Environment::Nl);
        assert!("unknown".parse::<Environment>().is_err());
    }

    #[test]
    fn environment_order_is_fixed() {
        let slugs: Vec<&str> = Environment::ALL.iter().map(|e| e.slug()).collect();
        assert_eq!(
            slugs,
            vec!["com", "com-br", "com-tr", "de", "es", "fi", "fr", "it", "nl"]
        );
    }

    #[test]
    fn revision_rejects_path_like_values() {
        assert!(Revision::new("PRODUCTION-201904011212-888653470").is_ok());
        assert!(Revision::new("").is_err());
        assert!(Revision::new("../etc/passwd").is_err());
        assert!(Revision::new(".hidden").is_err());
        assert!(Revision::new("a/b").is_err());
        assert!(Revision::new("x".repeat(129)).is_err());
    }

    #[test]
    fn absent_structure_is_not_serialized() {
        let entry = CatalogEntry {
            name: "Handshake".to_string(),
            hash: "abc".to_string(),
            structure: None,
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert_eq!(json, r#"{"Name":"Handshake","Hash":"abc"}"#);
    }

    #[test]
    fn record_uses_domain_label() {
        let record = LastCheckedRecord {
            hotel: Environment::ComBr,
            revision: Revision::new("r1").unwrap(),
            last_checked: DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["Hotel"], ".com.br");
        assert_eq!(json["Revision"], "r1");

        let back: LastCheckedRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
