//! Account and challenge record persistence.
//!
//! A [`Store`] owns a single database connection guarded by one mutex: at most one operation
//! runs against the database at a time, and every multi-statement operation runs in a
//! transaction that is committed or rolled back before the lock is released. Readers never
//! observe an account without its challenge slots.
//!
//! The schema is brought up to date by [`migrate::run`] when the store is opened, before any
//! other operation can reach the connection.
//!
//! Two engines are supported, SQLite and PostgreSQL, selected by
//! [`DatabaseConfig::engine`][crate::config::DatabaseConfig::engine]. See [`dialect`].

use crate::allow_list::AllowList;
use crate::config::DatabaseConfig;
use crate::credentials::{self, Credentials};
use crate::error::Error;
use sqlx::{AnyConnection, Connection};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use uuid::Uuid;

pub mod account;
pub mod dialect;
pub mod migrate;
pub mod records;

pub use account::{Account, Registration};
pub use dialect::Dialect;
pub use records::ChallengeSlots;

pub type SharedStore = Arc<Store>;

/// `DynTxtStore` is a type alias for a [`TxtStore`] shared between the HTTP API and a DNS
/// responder.
#[allow(clippy::module_name_repetitions)]
pub type DynTxtStore = Arc<dyn TxtStore + Send + Sync>;

/// An async trait describing dynamic storage of [RFC-8555][RFC-8555] [DNS-01] challenge response
/// values, keyed by the subdomain they should be served for.
///
/// [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
/// [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
#[async_trait::async_trait]
pub trait TxtStore {
    /// Replace the least recently written TXT value of the given subdomain.
    async fn update_value(&self, subdomain: &str, value: &str) -> Result<(), Error>;

    /// Get the TXT values of the given subdomain, most recent first. At most two values are
    /// returned, empty ones included.
    async fn fetch_values(&self, subdomain: &str) -> Result<Vec<String>, Error>;
}

pub struct Store {
    dialect: Dialect,
    conn: Mutex<AnyConnection>,
}

pub(crate) fn unix_timestamp() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

impl Store {
    /// Connect to the configured database and migrate it to the latest schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the database can't be reached, or any migration error from
    /// [`migrate::run`].
    pub async fn open(config: &DatabaseConfig) -> Result<Self, Error> {
        sqlx::any::install_default_drivers();
        let url = config.engine.connection_url(&config.connection);
        let conn = AnyConnection::connect(&url).await?;
        Self::init(config.engine, conn).await
    }

    /// Open a migrated store backed by a private in-memory SQLite database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if SQLite can't be initialized.
    pub async fn open_in_memory() -> Result<Self, Error> {
        sqlx::any::install_default_drivers();
        let conn = AnyConnection::connect("sqlite::memory:").await?;
        Self::init(Dialect::Sqlite, conn).await
    }

    async fn init(dialect: Dialect, mut conn: AnyConnection) -> Result<Self, Error> {
        let version = migrate::run(&mut conn, dialect).await?;
        tracing::info!("opened {dialect:?} store at schema version {version}");
        Ok(Self {
            dialect,
            conn: Mutex::new(conn),
        })
    }

    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Register a new account with a fresh identity, credential and subdomain, and create its
    /// two empty challenge slots.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPrefix`] without touching the database if `allow_from` holds a
    /// malformed entry. Returns [`Error::Storage`] if the account can't be written, in which
    /// case nothing of it is.
    pub async fn create_account(
        &self,
        allow_from: &AllowList,
        label: &str,
    ) -> Result<Registration, Error> {
        allow_from.validate()?;
        let Credentials {
            identity,
            subdomain,
            secret,
            secret_hash,
        } = Credentials::generate()?;
        let now = unix_timestamp();
        let account = Account {
            identity,
            subdomain,
            allow_from: allow_from.normalize().into(),
            label: label.to_string(),
            created_at: now,
            updated_at: now,
        };

        let mut conn = self.conn.lock().await;
        let mut tx = conn.begin().await?;
        account::insert(&mut tx, self.dialect, &account, &secret_hash).await?;
        records::insert_slots(
            &mut tx,
            self.dialect,
            &account.subdomain,
            records::SLOTS_PER_SUBDOMAIN,
        )
        .await?;
        tx.commit().await?;

        tracing::info!("registered account {} for \"{}\"", identity, account.subdomain);
        Ok(Registration {
            account,
            credential: secret,
        })
    }

    /// Fetch an account by identity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no account has this identity.
    pub async fn lookup_by_identity(&self, identity: &Uuid) -> Result<Account, Error> {
        let mut conn = self.conn.lock().await;
        let (account, _) = account::select_by_identity(&mut conn, self.dialect, identity).await?;
        Ok(account)
    }

    /// Fetch an account by identity and check `credential` against its stored hash. The hash
    /// is verified after the store lock is released.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown identity and [`Error::Unauthorized`] for a
    /// wrong credential.
    pub async fn authenticate(&self, identity: &Uuid, credential: &str) -> Result<Account, Error> {
        let (account, secret_hash) = {
            let mut conn = self.conn.lock().await;
            account::select_by_identity(&mut conn, self.dialect, identity).await?
        };
        if credentials::verify(credential, &secret_hash) {
            Ok(account)
        } else {
            Err(Error::Unauthorized)
        }
    }

    /// All registered accounts, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if the accounts can't be read, or [`Error::CorruptRecord`] if
    /// one of them can't be decoded.
    pub async fn list_all(&self) -> Result<Vec<Account>, Error> {
        let mut conn = self.conn.lock().await;
        account::select_all(&mut conn, self.dialect).await
    }

    /// Replace the label of the account owning `subdomain` and advance its update time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no account owns `subdomain`.
    pub async fn update_label(&self, subdomain: &str, label: &str) -> Result<(), Error> {
        let mut conn = self.conn.lock().await;
        account::update_label(&mut conn, self.dialect, subdomain, label, unix_timestamp()).await
    }
}

#[async_trait::async_trait]
impl TxtStore for Store {
    async fn update_value(&self, subdomain: &str, value: &str) -> Result<(), Error> {
        let mut conn = self.conn.lock().await;
        let mut tx = conn.begin().await?;
        let mut slots = records::load_slots(&mut tx, self.dialect, subdomain).await?;
        let slot = slots.rotate(value.to_string(), unix_timestamp());
        records::write_slot(&mut tx, self.dialect, slot).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn fetch_values(&self, subdomain: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.conn.lock().await;
        Ok(records::select_values(&mut conn, self.dialect, subdomain).await?)
    }
}
