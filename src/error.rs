//! Error types.

use axum::extract::rejection::JsonRejection;
use std::net::IpAddr;

/// Error enumerates the possible ACME Vault error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when an allow-list entry isn't an IPv4 or IPv6 network prefix in CIDR
    /// notation. The whole allow-list is rejected, no entry is silently dropped.
    #[error("invalid allow-list entry: \"{0}\"")]
    InvalidPrefix(String),

    /// Returned when clients `POST` the  [`/update` API endpoint][crate::api#update-post] with
    /// a `txt` value that isn't a valid [RFC-8555][RFC-8555] [DNS-01] challenge response value.
    ///
    /// These values MUST be a BASE64 encoded 32 byte SHA256 digest.
    ///
    /// [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
    /// [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
    #[error("TXT value is not a valid DNS-01 challenge response")]
    InvalidDNS01,

    /// Returned when a `fulldomain` is empty or isn't a name under the configured
    /// [`Config::domain`][crate::config::Config::domain].
    #[error("\"{0}\" is not a name under the service domain")]
    InvalidFulldomain(String),

    /// Returned when a lookup by identity or subdomain matches no stored account.
    #[error("{0} not found")]
    NotFound(String),

    /// Returned when the `X-Api-User`/`X-Api-Key` pair (or the admin key) is missing or
    /// doesn't match.
    #[error("unauthorized")]
    Unauthorized,

    /// Returned when an authenticated client updates from a source IP outside of the account
    /// allow-list, or names a subdomain that doesn't belong to the account.
    #[error("IP {0} is not authorized to update \"{1}\"")]
    AuthForbidden(IpAddr, String),

    /// Returned when clients `POST` invalid JSON.
    #[error(transparent)]
    JsonExtractorRejection(#[from] JsonRejection),

    /// Returned for any failure of the underlying database connection or statement, including
    /// uniqueness constraint violations. The cause is kept as the error source and never
    /// rendered into the message.
    #[error("storage failure")]
    Storage(#[from] sqlx::Error),

    /// Returned when a stored row can't be decoded, e.g. an allow-list that isn't a JSON list
    /// or a subdomain with a single challenge slot.
    #[error("stored record is corrupt: {0}")]
    CorruptRecord(String),

    /// Returned when hashing or parsing a credential hash fails.
    #[error("credential hashing failed: {0}")]
    Credential(String),

    /// Returned when a schema migration step fails. The step's transaction has been rolled
    /// back and the version marker still holds the previous version.
    #[error("schema migration to version {version} failed")]
    Migration {
        version: u32,
        #[source]
        source: Box<Error>,
    },

    /// Returned when the stored schema version marker isn't an integer.
    #[error("schema version marker is corrupt: \"{0}\"")]
    CorruptVersionMarker(String),

    /// Returned when the database was written by a newer release than this one.
    #[error("schema version {0} is newer than the latest known version {1}")]
    UnknownSchemaVersion(u32, u32),

    /// Returned when a generic IO error occurs.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON fails, e.g. when
    /// [trying to load a `Config`][crate::config::Config::try_from_file] or decoding a
    /// registration body.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),
}
