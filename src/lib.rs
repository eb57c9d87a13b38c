//! ACME Vault
//!
//! Persistent account and challenge-record storage for an [acme-dns] style service.
//!
//! Registered accounts each own one subdomain and may publish [RFC-8555][RFC-8555] [DNS-01]
//! challenge responses for it through the HTTP API. Two TXT values are kept per subdomain so
//! that wildcard and apex certificates can be validated together. State lives in SQLite or
//! PostgreSQL, and the schema is upgraded in place from older layouts on startup.
//!
//! [acme-dns]: https://github.com/joohoi/acme-dns
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod allow_list;
pub mod api;
pub mod config;
pub mod credentials;
pub mod error;
pub mod store;

pub use allow_list::AllowList;
pub use api::new as new_http;
pub use config::{Config, SharedConfig};
pub use store::{SharedStore, Store, TxtStore};
