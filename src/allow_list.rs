//! Per-account source network allow-lists.
//!
//! An [`AllowList`] is the ordered set of network prefixes an account's update requests may
//! originate from. An empty list places no restriction on the source address.
use crate::error::Error;
use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::str::FromStr;

#[derive(Default, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList(Vec<String>);

impl AllowList {
    #[must_use]
    pub fn new(entries: Vec<String>) -> Self {
        Self(entries)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.0
    }

    /// Check that every entry is a network prefix.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPrefix`] naming the first entry that doesn't parse.
    pub fn validate(&self) -> Result<(), Error> {
        match self.0.iter().find(|entry| parse_prefix(entry).is_none()) {
            Some(bad) => Err(Error::InvalidPrefix(bad.clone())),
            None => Ok(()),
        }
    }

    /// The entries that parse as network prefixes, rendered canonically. Malformed entries
    /// are skipped.
    #[must_use]
    pub fn normalize(&self) -> Vec<String> {
        self.networks().iter().map(ToString::to_string).collect()
    }

    #[must_use]
    pub fn networks(&self) -> Vec<IpNetwork> {
        self.0.iter().filter_map(|entry| parse_prefix(entry)).collect()
    }

    /// Whether `ip` may be the source of an update. Always true for an empty list.
    #[must_use]
    pub fn permits(&self, ip: IpAddr) -> bool {
        self.is_empty() || self.networks().iter().any(|network| network.contains(ip))
    }

    /// Render the list for the `AllowFrom` column.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJSON`] if the list can't be serialized.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self.0)?)
    }

    /// Decode a stored `AllowFrom` column. Blank values written by old releases are read as
    /// the empty list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptRecord`] if the value isn't a JSON list of strings.
    pub fn from_json(raw: &str) -> Result<Self, Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str::<Option<Vec<String>>>(raw)
            .map(|entries| Self(entries.unwrap_or_default()))
            .map_err(|err| Error::CorruptRecord(format!("allow-list {raw:?}: {err}")))
    }
}

impl From<Vec<String>> for AllowList {
    fn from(entries: Vec<String>) -> Self {
        Self(entries)
    }
}

// NB: IpNetwork::from_str accepts a bare address as a host prefix. Allow-list entries must
//     spell out the mask length.
fn parse_prefix(entry: &str) -> Option<IpNetwork> {
    let entry = entry.trim();
    if !entry.contains('/') {
        return None;
    }
    IpNetwork::from_str(entry).ok()
}
