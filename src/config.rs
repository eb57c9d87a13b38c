use crate::error::Error;
use crate::store::Dialect;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::fs::File;
use std::io::BufReader;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub type SharedConfig = Arc<Config>;

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// The zone registered subdomains live under, e.g. `auth.example.com`.
    pub domain: String,
    pub database: DatabaseConfig,
    pub api_bind_addr: SocketAddr,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub api_timeout: Duration,
    /// Key required in the `X-Api-Key` header of the admin endpoints. The admin endpoints
    /// refuse every request when unset.
    #[serde(default)]
    pub admin_api_key: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct DatabaseConfig {
    pub engine: Dialect,
    /// A file path or `sqlite:` URL for SQLite, a `postgres://` URL for PostgreSQL.
    pub connection: String,
}

impl Config {
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let mut conf: Config = serde_json::from_reader(reader)?;
        conf.domain = normalize_name(&conf.domain);
        Ok(conf)
    }

    /// The fully qualified name of a registered subdomain.
    #[must_use]
    pub fn fulldomain(&self, subdomain: &str) -> String {
        format!("{subdomain}.{}", self.domain)
    }

    /// Recover the subdomain label from a fully qualified name under [`Config::domain`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidFulldomain`] if `fulldomain` isn't a strict subdomain of the
    /// service domain.
    pub fn subdomain_of(&self, fulldomain: &str) -> Result<String, Error> {
        let name = normalize_name(fulldomain);
        name.strip_suffix(&self.domain)
            .and_then(|prefix| prefix.strip_suffix('.'))
            .filter(|subdomain| !subdomain.is_empty())
            .map(ToString::to_string)
            .ok_or_else(|| Error::InvalidFulldomain(fulldomain.to_string()))
    }

    #[must_use]
    pub fn admin_key_matches(&self, presented: Option<&str>) -> bool {
        matches!(
            (self.admin_api_key.as_deref(), presented),
            (Some(expected), Some(presented)) if !expected.is_empty() && expected == presented
        )
    }
}

fn normalize_name(name: &str) -> String {
    name.trim().trim_end_matches('.').to_ascii_lowercase()
}
