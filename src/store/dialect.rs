//! SQL dialect adapter.
//!
//! Every statement in the store is written once using PostgreSQL's `$N` positional
//! placeholders. [`Dialect::rewrite`] turns it into the form the configured engine expects, and
//! the remaining per-engine differences (DDL, catalog queries) live on [`Dialect`] too.
use serde::Deserialize;
use sqlx::{Any, AnyConnection};
use std::borrow::Cow;

/// The relational engines the store can run on.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    #[serde(rename = "sqlite3", alias = "sqlite")]
    Sqlite,
    #[serde(rename = "postgres", alias = "postgresql")]
    Postgres,
}

impl Dialect {
    /// Rewrite a `$N` placeholder statement for this engine, preserving parameter order.
    ///
    /// SQLite receives numbered `?N` placeholders. Placeholders inside single-quoted literals
    /// are left alone.
    #[must_use]
    pub fn rewrite(self, sql: &str) -> Cow<'_, str> {
        match self {
            Dialect::Postgres => Cow::Borrowed(sql),
            Dialect::Sqlite => Cow::Owned(dollar_to_question(sql)),
        }
    }

    /// Build the connection URL `sqlx::any` expects from a configured connection string.
    /// Bare SQLite paths are opened read-write, created if missing.
    #[must_use]
    pub fn connection_url(self, connection: &str) -> String {
        match self {
            Dialect::Sqlite if !connection.starts_with("sqlite:") => {
                format!("sqlite://{connection}?mode=rwc")
            }
            _ => connection.to_string(),
        }
    }

    pub(crate) fn create_txt_table(self) -> &'static str {
        match self {
            Dialect::Sqlite => {
                "CREATE TABLE IF NOT EXISTS txt(
                    Subdomain TEXT NOT NULL,
                    Value TEXT NOT NULL DEFAULT '',
                    LastUpdate INT
                )"
            }
            Dialect::Postgres => {
                "CREATE TABLE IF NOT EXISTS txt(
                    rowid SERIAL,
                    Subdomain TEXT NOT NULL,
                    Value TEXT NOT NULL DEFAULT '',
                    LastUpdate INT
                )"
            }
        }
    }

    pub(crate) fn add_column(self, table: &str, column_def: &str) -> String {
        match self {
            Dialect::Sqlite => format!("ALTER TABLE {table} ADD COLUMN {column_def}"),
            Dialect::Postgres => format!("ALTER TABLE {table} ADD COLUMN IF NOT EXISTS {column_def}"),
        }
    }

    pub(crate) fn drop_column(self, table: &str, column: &str) -> String {
        match self {
            Dialect::Sqlite => format!("ALTER TABLE {table} DROP COLUMN {column}"),
            Dialect::Postgres => format!("ALTER TABLE {table} DROP COLUMN IF EXISTS {column}"),
        }
    }

    /// Whether a failed column drop can be ignored. Older SQLite builds have no
    /// `DROP COLUMN`, a leftover column is only dead weight there.
    pub(crate) fn tolerates_failed_drop(self) -> bool {
        self == Dialect::Sqlite
    }

    /// Whether `table` has a column named `column` (case-insensitive).
    pub(crate) async fn column_exists(
        self,
        conn: &mut AnyConnection,
        table: &str,
        column: &str,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar::<Any, i64>(&self.rewrite(self.column_count_query()))
            .bind(table)
            .bind(column)
            .fetch_one(&mut *conn)
            .await?;
        Ok(count > 0)
    }

    /// Counts the columns of table `$1` named `$2`.
    fn column_count_query(self) -> &'static str {
        match self {
            Dialect::Sqlite => {
                "SELECT COUNT(*) FROM pragma_table_info($1) WHERE lower(name) = lower($2)"
            }
            Dialect::Postgres => {
                "SELECT COUNT(*) FROM information_schema.columns
                 WHERE table_schema = current_schema()
                   AND table_name = lower($1::text)
                   AND lower(column_name) = lower($2::text)"
            }
        }
    }

    /// Whether a database error reports a column that already exists.
    pub(crate) fn is_duplicate_column(self, err: &sqlx::Error) -> bool {
        let sqlx::Error::Database(db_err) = err else {
            return false;
        };
        match self {
            Dialect::Sqlite => db_err.message().contains("duplicate column"),
            Dialect::Postgres => db_err.code().as_deref() == Some("42701"),
        }
    }
}

fn dollar_to_question(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quoted = false;
    let mut chars = sql.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                quoted = !quoted;
                out.push(c);
            }
            '$' if !quoted && chars.peek().is_some_and(char::is_ascii_digit) => out.push('?'),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};

    #[test]
    fn postgres_statements_pass_through() {
        let sql = "UPDATE txt SET Value=$1 WHERE Subdomain=$2";
        assert!(matches!(Dialect::Postgres.rewrite(sql), Cow::Borrowed(s) if s == sql));
    }

    #[test]
    fn sqlite_placeholders_keep_their_position() {
        assert_eq!(
            Dialect::Sqlite.rewrite(
                "INSERT INTO records(a, b, c) values($1, $2, $3) -- $10 $11 $12"
            ),
            "INSERT INTO records(a, b, c) values(?1, ?2, ?3) -- ?10 ?11 ?12"
        );
        assert_eq!(
            Dialect::Sqlite.rewrite("SELECT $2, $1, $2"),
            "SELECT ?2, ?1, ?2"
        );
    }

    #[test]
    fn sqlite_rewrite_skips_literals_and_bare_dollars() {
        assert_eq!(
            Dialect::Sqlite.rewrite("SELECT '$1', 'it''s $2', $3, $ FROM t"),
            "SELECT '$1', 'it''s $2', ?3, $ FROM t"
        );
    }

    #[test]
    fn sqlite_paths_become_urls() {
        assert_eq!(
            Dialect::Sqlite.connection_url("/var/lib/acmevault.db"),
            "sqlite:///var/lib/acmevault.db?mode=rwc"
        );
        assert_eq!(
            Dialect::Sqlite.connection_url("sqlite::memory:"),
            "sqlite::memory:"
        );
        assert_eq!(
            Dialect::Postgres.connection_url("postgres://acme@localhost/acme"),
            "postgres://acme@localhost/acme"
        );
    }

    #[derive(Debug)]
    struct ReportedError {
        message: &'static str,
        code: Option<&'static str>,
    }

    impl std::fmt::Display for ReportedError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str(self.message)
        }
    }

    impl std::error::Error for ReportedError {}

    impl DatabaseError for ReportedError {
        fn message(&self) -> &str {
            self.message
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn database_error(message: &'static str, code: Option<&'static str>) -> sqlx::Error {
        sqlx::Error::Database(Box::new(ReportedError { message, code }))
    }

    #[test]
    fn duplicate_column_detection() {
        let sqlite = database_error("duplicate column name: DomainName", Some("1"));
        let postgres = database_error(
            "column \"domainname\" of relation \"records\" already exists",
            Some("42701"),
        );
        let other = database_error("relation \"records\" does not exist", Some("42P01"));

        assert!(Dialect::Sqlite.is_duplicate_column(&sqlite));
        assert!(!Dialect::Sqlite.is_duplicate_column(&other));
        assert!(Dialect::Postgres.is_duplicate_column(&postgres));
        assert!(!Dialect::Postgres.is_duplicate_column(&sqlite));
        assert!(!Dialect::Postgres.is_duplicate_column(&other));
        assert!(!Dialect::Postgres.is_duplicate_column(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn postgres_ddl() {
        let pg = Dialect::Postgres;
        assert!(pg.create_txt_table().contains("rowid SERIAL"));
        assert!(!Dialect::Sqlite.create_txt_table().contains("rowid"));
        assert_eq!(
            pg.add_column("records", "CreatedAt BIGINT DEFAULT 0"),
            "ALTER TABLE records ADD COLUMN IF NOT EXISTS CreatedAt BIGINT DEFAULT 0"
        );
        assert_eq!(
            pg.drop_column("records", "Value"),
            "ALTER TABLE records DROP COLUMN IF EXISTS Value"
        );
        assert_eq!(
            Dialect::Sqlite.drop_column("records", "Value"),
            "ALTER TABLE records DROP COLUMN Value"
        );
        assert!(!pg.tolerates_failed_drop());
        assert!(Dialect::Sqlite.tolerates_failed_drop());
    }

    #[test]
    fn column_queries_use_engine_catalogs() {
        let pg = Dialect::Postgres.rewrite(Dialect::Postgres.column_count_query());
        assert!(pg.contains("information_schema.columns"));
        assert!(pg.contains("$1::text") && pg.contains("$2::text"));

        let sqlite = Dialect::Sqlite.rewrite(Dialect::Sqlite.column_count_query());
        assert!(sqlite.contains("pragma_table_info(?1)"));
        assert!(sqlite.contains("lower(?2)"));
    }

    #[test]
    fn engine_names() {
        let engine: Dialect = serde_json::from_str("\"sqlite3\"").unwrap();
        assert_eq!(engine, Dialect::Sqlite);
        let engine: Dialect = serde_json::from_str("\"postgres\"").unwrap();
        assert_eq!(engine, Dialect::Postgres);
        assert!(serde_json::from_str::<Dialect>("\"mysql\"").is_err());
    }
}
