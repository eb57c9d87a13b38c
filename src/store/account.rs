//! Registered accounts.
use crate::allow_list::AllowList;
use crate::error::Error;
use crate::store::dialect::Dialect;
use sqlx::{Any, AnyConnection};
use uuid::Uuid;

/// A registered account. The credential hash never leaves the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub identity: Uuid,
    pub subdomain: String,
    pub allow_from: AllowList,
    pub label: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Account {
    /// The name ACME clients CNAME their `_acme-challenge` record to.
    #[must_use]
    pub fn fulldomain(&self, domain: &str) -> String {
        format!("{}.{domain}", self.subdomain)
    }
}

/// The result of a registration: the new account plus its credential, which is never
/// available again.
#[derive(Debug, Clone)]
pub struct Registration {
    pub account: Account,
    pub credential: String,
}

type AccountRow = (String, String, String, String, i64, i64);

const ACCOUNT_COLUMNS: &str = "Username, Subdomain, COALESCE(AllowFrom, '[]'), \
     COALESCE(DomainName, ''), CAST(COALESCE(CreatedAt, 0) AS BIGINT), \
     CAST(COALESCE(UpdatedAt, 0) AS BIGINT)";

fn decode(row: AccountRow) -> Result<Account, Error> {
    let (identity, subdomain, allow_from, label, created_at, updated_at) = row;
    let identity = Uuid::parse_str(&identity)
        .map_err(|err| Error::CorruptRecord(format!("identity {identity:?}: {err}")))?;
    Ok(Account {
        identity,
        subdomain,
        allow_from: AllowList::from_json(&allow_from)?,
        label,
        created_at,
        updated_at,
    })
}

pub(crate) async fn insert(
    conn: &mut AnyConnection,
    dialect: Dialect,
    account: &Account,
    secret_hash: &str,
) -> Result<(), Error> {
    let allow_from = account.allow_from.to_json()?;
    sqlx::query(&dialect.rewrite(
        "INSERT INTO records(
            Username,
            Password,
            Subdomain,
            AllowFrom,
            DomainName,
            CreatedAt,
            UpdatedAt)
            values($1, $2, $3, $4, $5, $6, $7)",
    ))
    .bind(account.identity.to_string())
    .bind(secret_hash)
    .bind(account.subdomain.as_str())
    .bind(allow_from)
    .bind(account.label.as_str())
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Fetch an account together with its credential hash.
pub(crate) async fn select_by_identity(
    conn: &mut AnyConnection,
    dialect: Dialect,
    identity: &Uuid,
) -> Result<(Account, String), Error> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS}, Password FROM records WHERE Username = $1 LIMIT 1");
    let row = sqlx::query_as::<Any, (String, String, String, String, i64, i64, String)>(
        &dialect.rewrite(&sql),
    )
    .bind(identity.to_string())
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| Error::NotFound(format!("account {identity}")))?;

    let (username, subdomain, allow_from, label, created_at, updated_at, secret_hash) = row;
    let account = decode((username, subdomain, allow_from, label, created_at, updated_at))?;
    Ok((account, secret_hash))
}

pub(crate) async fn select_all(
    conn: &mut AnyConnection,
    dialect: Dialect,
) -> Result<Vec<Account>, Error> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM records ORDER BY CreatedAt, Username");
    sqlx::query_as::<Any, AccountRow>(&dialect.rewrite(&sql))
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}

pub(crate) async fn select_subdomains(
    conn: &mut AnyConnection,
    dialect: Dialect,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<Any, String>(&dialect.rewrite(
        "SELECT Subdomain FROM records WHERE Subdomain IS NOT NULL AND Subdomain <> ''",
    ))
    .fetch_all(&mut *conn)
    .await
}

/// Replace the label of the account owning `subdomain`. `UpdatedAt` always moves forward,
/// by one second past its stored value if `now` doesn't.
pub(crate) async fn update_label(
    conn: &mut AnyConnection,
    dialect: Dialect,
    subdomain: &str,
    label: &str,
    now: i64,
) -> Result<(), Error> {
    let result = sqlx::query(&dialect.rewrite(
        "UPDATE records SET DomainName = $1,
            UpdatedAt = CASE
                WHEN $2 > COALESCE(UpdatedAt, 0) THEN $2
                ELSE COALESCE(UpdatedAt, 0) + 1
            END
         WHERE Subdomain = $3",
    ))
    .bind(label)
    .bind(now)
    .bind(subdomain)
    .execute(&mut *conn)
    .await?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("subdomain \"{subdomain}\"")));
    }
    Ok(())
}
