//! Schema versioning.
//!
//! The current schema version lives in the `acmedns` table under the `db_version` key. A
//! database without that row predates versioning and is treated as version 0.
//!
//! [`run`] brings a database up to [`LATEST_VERSION`] by applying each pending [`Migration`] in
//! order. Every step runs in its own transaction together with the marker update, so a crash
//! leaves either the old version with none of the step applied or the new version with all
//! of it. Steps are also idempotent on their own: re-running a step that already committed
//! changes nothing.
use crate::error::Error;
use crate::store::dialect::Dialect;
use crate::store::{account, records};
use sqlx::{Any, AnyConnection, Connection};
use tracing::{debug, info, warn};

pub const LATEST_VERSION: u32 = 2;

/// Account columns from before version 1 that are no longer read.
const LEGACY_COLUMNS: [&str; 2] = ["Value", "LastActive"];

/// Account columns introduced in version 2.
const V2_COLUMNS: [(&str, &str); 3] = [
    ("DomainName", "DomainName TEXT DEFAULT ''"),
    ("CreatedAt", "CreatedAt BIGINT DEFAULT 0"),
    ("UpdatedAt", "UpdatedAt BIGINT DEFAULT 0"),
];

const CREATE_MARKER_TABLE: &str = "CREATE TABLE IF NOT EXISTS acmedns(
    Name TEXT,
    Value TEXT
)";

const CREATE_RECORDS_TABLE: &str = "CREATE TABLE IF NOT EXISTS records(
    Username TEXT UNIQUE NOT NULL PRIMARY KEY,
    Password TEXT UNIQUE NOT NULL,
    Subdomain TEXT UNIQUE NOT NULL,
    AllowFrom TEXT,
    DomainName TEXT DEFAULT '',
    CreatedAt BIGINT DEFAULT 0,
    UpdatedAt BIGINT DEFAULT 0
)";

/// Schema migration steps, in the order they must be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Migration {
    /// Give every subdomain its two challenge slots and drop the per-account value columns
    /// they replace.
    ChallengeSlots,
    /// Add the account label and the creation/update timestamps.
    LabelAndTimestamps,
}

pub const MIGRATIONS: [Migration; LATEST_VERSION as usize] =
    [Migration::ChallengeSlots, Migration::LabelAndTimestamps];

impl Migration {
    /// The schema version a database is at once this step has committed.
    #[must_use]
    pub fn target_version(self) -> u32 {
        match self {
            Migration::ChallengeSlots => 1,
            Migration::LabelAndTimestamps => 2,
        }
    }

    /// Apply this step and advance the version marker to its target, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Storage`] if any statement fails. Nothing of the step is committed in
    /// that case.
    pub async fn apply(self, conn: &mut AnyConnection, dialect: Dialect) -> Result<(), Error> {
        let mut tx = conn.begin().await?;
        match self {
            Migration::ChallengeSlots => challenge_slots(&mut tx, dialect).await?,
            Migration::LabelAndTimestamps => label_and_timestamps(&mut tx, dialect).await?,
        }
        write_version(&mut tx, dialect, self.target_version()).await?;
        tx.commit().await?;
        Ok(())
    }
}

/// Create any missing tables, then apply every pending migration. Returns the resulting
/// schema version.
///
/// # Errors
///
/// Returns [`Error::CorruptVersionMarker`] or [`Error::UnknownSchemaVersion`] when the stored
/// version can't be migrated from, and [`Error::Migration`] when a step fails. The store must
/// not be used after any of these.
pub async fn run(conn: &mut AnyConnection, dialect: Dialect) -> Result<u32, Error> {
    bootstrap(conn, dialect).await?;

    let mut version = read_version(conn, dialect).await?;
    if version > LATEST_VERSION {
        return Err(Error::UnknownSchemaVersion(version, LATEST_VERSION));
    }
    for migration in MIGRATIONS
        .iter()
        .filter(move |migration| migration.target_version() > version)
    {
        let target = migration.target_version();
        info!("migrating database schema from version {version} to {target}");
        migration
            .apply(conn, dialect)
            .await
            .map_err(|err| Error::Migration {
                version: target,
                source: Box::new(err),
            })?;
        version = target;
    }
    debug!("database schema at version {version}");
    Ok(version)
}

async fn bootstrap(conn: &mut AnyConnection, dialect: Dialect) -> Result<(), Error> {
    let mut tx = conn.begin().await?;
    for ddl in [
        CREATE_MARKER_TABLE,
        CREATE_RECORDS_TABLE,
        dialect.create_txt_table(),
    ] {
        sqlx::query(ddl).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Read the schema version marker. A missing marker reads as version 0.
///
/// # Errors
///
/// Returns [`Error::CorruptVersionMarker`] if the marker isn't a non-negative integer.
pub async fn read_version(conn: &mut AnyConnection, dialect: Dialect) -> Result<u32, Error> {
    let marker = sqlx::query_scalar::<Any, String>(
        &dialect.rewrite("SELECT Value FROM acmedns WHERE Name = 'db_version' LIMIT 1"),
    )
    .fetch_optional(&mut *conn)
    .await?;
    match marker {
        None => Ok(0),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| Error::CorruptVersionMarker(raw)),
    }
}

async fn write_version(
    conn: &mut AnyConnection,
    dialect: Dialect,
    version: u32,
) -> Result<(), sqlx::Error> {
    let version = version.to_string();
    let updated = sqlx::query(
        &dialect.rewrite("UPDATE acmedns SET Value = $1 WHERE Name = 'db_version'"),
    )
    .bind(version.as_str())
    .execute(&mut *conn)
    .await?;
    if updated.rows_affected() == 0 {
        sqlx::query(&dialect.rewrite(
            "INSERT INTO acmedns (Name, Value) VALUES ('db_version', $1)",
        ))
        .bind(version.as_str())
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}

async fn challenge_slots(conn: &mut AnyConnection, dialect: Dialect) -> Result<(), Error> {
    for subdomain in account::select_subdomains(conn, dialect).await? {
        let present = records::count_slots(conn, dialect, &subdomain).await?;
        if present > records::SLOTS_PER_SUBDOMAIN {
            debug!("trimming {present} challenge slots for \"{subdomain}\"");
            records::trim_slots(conn, dialect, &subdomain).await?;
        } else if present < records::SLOTS_PER_SUBDOMAIN {
            let missing = records::SLOTS_PER_SUBDOMAIN - present;
            debug!("adding {missing} challenge slot(s) for \"{subdomain}\"");
            records::insert_slots(conn, dialect, &subdomain, missing).await?;
        }
    }

    for column in LEGACY_COLUMNS {
        if !dialect.column_exists(conn, "records", column).await? {
            continue;
        }
        match sqlx::query(&dialect.drop_column("records", column))
            .execute(&mut *conn)
            .await
        {
            Ok(_) => info!("dropped legacy column records.{column}"),
            Err(err) if dialect.tolerates_failed_drop() => {
                warn!("leaving legacy column records.{column} in place: {err}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

async fn label_and_timestamps(conn: &mut AnyConnection, dialect: Dialect) -> Result<(), Error> {
    for (column, column_def) in V2_COLUMNS {
        if dialect.column_exists(conn, "records", column).await? {
            continue;
        }
        match sqlx::query(&dialect.add_column("records", column_def))
            .execute(&mut *conn)
            .await
        {
            Ok(_) => info!("added column records.{column}"),
            Err(err) if dialect.is_duplicate_column(&err) => {
                debug!("column records.{column} already present");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_conn() -> AnyConnection {
        sqlx::any::install_default_drivers();
        AnyConnection::connect("sqlite::memory:").await.unwrap()
    }

    /// A database as written before schema versioning: single-value account rows and no
    /// marker.
    async fn legacy_conn() -> AnyConnection {
        let mut conn = memory_conn().await;
        sqlx::query(
            "CREATE TABLE records(
                Username TEXT UNIQUE NOT NULL PRIMARY KEY,
                Password TEXT UNIQUE NOT NULL,
                Subdomain TEXT UNIQUE NOT NULL,
                Value TEXT,
                LastActive INT,
                AllowFrom TEXT
            )",
        )
        .execute(&mut conn)
        .await
        .unwrap();
        for (user, subdomain) in [("u1", "sub-one"), ("u2", "sub-two")] {
            sqlx::query(
                "INSERT INTO records (Username, Password, Subdomain, Value, LastActive, AllowFrom)
                 VALUES (?1, ?2, ?3, 'old', 0, '[]')",
            )
            .bind(user)
            .bind(format!("hash-{user}"))
            .bind(subdomain)
            .execute(&mut conn)
            .await
            .unwrap();
        }
        conn
    }

    async fn columns(conn: &mut AnyConnection) -> Vec<String> {
        sqlx::query_scalar::<Any, String>("SELECT name FROM pragma_table_info('records')")
            .fetch_all(&mut *conn)
            .await
            .unwrap()
    }

    async fn slot_counts(conn: &mut AnyConnection) -> Vec<(String, i64)> {
        sqlx::query_as::<Any, (String, i64)>(
            "SELECT Subdomain, COUNT(*) FROM txt GROUP BY Subdomain ORDER BY Subdomain",
        )
        .fetch_all(&mut *conn)
        .await
        .unwrap()
    }

    #[test]
    fn steps_cover_every_version_in_order() {
        let targets: Vec<u32> = MIGRATIONS.iter().map(|m| m.target_version()).collect();
        assert_eq!(targets, (1..=LATEST_VERSION).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn fresh_database_reaches_latest_version() {
        let mut conn = memory_conn().await;
        assert_eq!(run(&mut conn, Dialect::Sqlite).await.unwrap(), LATEST_VERSION);
        assert_eq!(
            read_version(&mut conn, Dialect::Sqlite).await.unwrap(),
            LATEST_VERSION
        );
        let columns = columns(&mut conn).await;
        for (column, _) in V2_COLUMNS {
            assert!(columns.iter().any(|c| c == column));
        }
    }

    #[tokio::test]
    async fn legacy_database_is_upgraded() {
        let mut conn = legacy_conn().await;
        run(&mut conn, Dialect::Sqlite).await.unwrap();

        assert_eq!(
            slot_counts(&mut conn).await,
            vec![("sub-one".to_string(), 2), ("sub-two".to_string(), 2)]
        );
        let columns = columns(&mut conn).await;
        assert!(!columns.iter().any(|c| c == "Value" || c == "LastActive"));
        for (column, _) in V2_COLUMNS {
            assert!(columns.iter().any(|c| c == column));
        }
        let subdomains: i64 = sqlx::query_scalar::<Any, i64>("SELECT COUNT(*) FROM records")
            .fetch_one(&mut conn)
            .await
            .unwrap();
        assert_eq!(subdomains, 2);
    }

    #[tokio::test]
    async fn stepwise_upgrade_matches_direct_upgrade() {
        let mut direct = legacy_conn().await;
        run(&mut direct, Dialect::Sqlite).await.unwrap();

        let mut stepwise = legacy_conn().await;
        bootstrap(&mut stepwise, Dialect::Sqlite).await.unwrap();
        Migration::ChallengeSlots
            .apply(&mut stepwise, Dialect::Sqlite)
            .await
            .unwrap();
        assert_eq!(read_version(&mut stepwise, Dialect::Sqlite).await.unwrap(), 1);
        run(&mut stepwise, Dialect::Sqlite).await.unwrap();

        assert_eq!(columns(&mut direct).await, columns(&mut stepwise).await);
        assert_eq!(slot_counts(&mut direct).await, slot_counts(&mut stepwise).await);
        assert_eq!(
            read_version(&mut direct, Dialect::Sqlite).await.unwrap(),
            read_version(&mut stepwise, Dialect::Sqlite).await.unwrap()
        );
    }

    #[tokio::test]
    async fn rerunning_a_step_changes_nothing() {
        let mut conn = legacy_conn().await;
        run(&mut conn, Dialect::Sqlite).await.unwrap();
        let columns_before = columns(&mut conn).await;
        let slots_before = slot_counts(&mut conn).await;

        for migration in MIGRATIONS {
            migration.apply(&mut conn, Dialect::Sqlite).await.unwrap();
            migration.apply(&mut conn, Dialect::Sqlite).await.unwrap();
        }
        assert_eq!(columns(&mut conn).await, columns_before);
        assert_eq!(slot_counts(&mut conn).await, slots_before);

        // Re-applying the last step leaves the marker where it was.
        assert_eq!(
            read_version(&mut conn, Dialect::Sqlite).await.unwrap(),
            LATEST_VERSION
        );
        let markers: i64 =
            sqlx::query_scalar::<Any, i64>("SELECT COUNT(*) FROM acmedns WHERE Name = 'db_version'")
                .fetch_one(&mut conn)
                .await
                .unwrap();
        assert_eq!(markers, 1);
    }

    #[tokio::test]
    async fn partial_slots_are_topped_up() {
        let mut conn = legacy_conn().await;
        bootstrap(&mut conn, Dialect::Sqlite).await.unwrap();
        records::insert_slots(&mut conn, Dialect::Sqlite, "sub-one", 1)
            .await
            .unwrap();
        run(&mut conn, Dialect::Sqlite).await.unwrap();
        assert_eq!(
            slot_counts(&mut conn).await,
            vec![("sub-one".to_string(), 2), ("sub-two".to_string(), 2)]
        );
    }

    #[tokio::test]
    async fn surplus_slots_are_trimmed() {
        let mut conn = legacy_conn().await;
        bootstrap(&mut conn, Dialect::Sqlite).await.unwrap();
        records::insert_slots(&mut conn, Dialect::Sqlite, "sub-one", 4)
            .await
            .unwrap();
        run(&mut conn, Dialect::Sqlite).await.unwrap();
        assert_eq!(
            slot_counts(&mut conn).await,
            vec![("sub-one".to_string(), 2), ("sub-two".to_string(), 2)]
        );
        let kept: Vec<i64> = sqlx::query_scalar::<Any, i64>(
            "SELECT rowid FROM txt WHERE Subdomain = 'sub-one' ORDER BY rowid",
        )
        .fetch_all(&mut conn)
        .await
        .unwrap();
        assert_eq!(kept, vec![1, 2]);
    }

    #[tokio::test]
    async fn corrupt_marker_is_fatal() {
        let mut conn = memory_conn().await;
        bootstrap(&mut conn, Dialect::Sqlite).await.unwrap();
        sqlx::query("INSERT INTO acmedns (Name, Value) VALUES ('db_version', 'two')")
            .execute(&mut conn)
            .await
            .unwrap();
        match run(&mut conn, Dialect::Sqlite).await {
            Err(Error::CorruptVersionMarker(raw)) => assert_eq!(raw, "two"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn newer_schema_is_refused() {
        let mut conn = memory_conn().await;
        bootstrap(&mut conn, Dialect::Sqlite).await.unwrap();
        write_version(&mut conn, Dialect::Sqlite, LATEST_VERSION + 1)
            .await
            .unwrap();
        assert!(matches!(
            run(&mut conn, Dialect::Sqlite).await,
            Err(Error::UnknownSchemaVersion(3, LATEST_VERSION))
        ));
    }

    #[tokio::test]
    async fn failed_step_rolls_back() {
        let mut conn = legacy_conn().await;
        bootstrap(&mut conn, Dialect::Sqlite).await.unwrap();
        // Without the txt table the slot inserts fail part way through the step.
        sqlx::query("DROP TABLE txt").execute(&mut conn).await.unwrap();

        let err = Migration::ChallengeSlots
            .apply(&mut conn, Dialect::Sqlite)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(read_version(&mut conn, Dialect::Sqlite).await.unwrap(), 0);
        assert!(columns(&mut conn).await.iter().any(|c| c == "Value"));
    }

    #[tokio::test]
    async fn failed_step_is_reported_with_its_version() {
        let mut conn = legacy_conn().await;
        bootstrap(&mut conn, Dialect::Sqlite).await.unwrap();
        sqlx::query("DROP TABLE txt").execute(&mut conn).await.unwrap();
        // run() only creates missing tables, so leave one behind that the step can't write.
        sqlx::query("CREATE TABLE txt(Subdomain TEXT NOT NULL)")
            .execute(&mut conn)
            .await
            .unwrap();
        match run(&mut conn, Dialect::Sqlite).await {
            Err(Error::Migration { version, .. }) => assert_eq!(version, 1),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(read_version(&mut conn, Dialect::Sqlite).await.unwrap(), 0);
    }
}
