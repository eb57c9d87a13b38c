//! Challenge record slots.
//!
//! Every subdomain owns exactly [`SLOTS_PER_SUBDOMAIN`] rows in the `txt` table. An update
//! always overwrites the slot written least recently, so a new [DNS-01] value never clobbers
//! the value of an issuance that may still be validating.
//!
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
use crate::error::Error;
use crate::store::dialect::Dialect;
use sqlx::{Any, AnyConnection};

pub const SLOTS_PER_SUBDOMAIN: usize = 2;

/// One stored challenge value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub(crate) row: i64,
    pub value: String,
    pub last_update: i64,
}

/// The fixed pair of slots for a subdomain, in storage order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeSlots([Slot; SLOTS_PER_SUBDOMAIN]);

impl ChallengeSlots {
    #[must_use]
    pub fn new(slots: [Slot; SLOTS_PER_SUBDOMAIN]) -> Self {
        Self(slots)
    }

    /// Index of the least recently written slot. Ties go to the first slot in storage order.
    fn oldest(&self) -> usize {
        usize::from(self.0[1].last_update < self.0[0].last_update)
    }

    /// Overwrite the least recently written slot with `value`.
    ///
    /// The slot is stamped strictly after the other slot, even when both writes land in the
    /// same second of `now`, so rotation order never depends on clock resolution.
    pub fn rotate(&mut self, value: String, now: i64) -> &Slot {
        let oldest = self.oldest();
        let newest_stamp = self.0[1 - oldest].last_update;
        let slot = &mut self.0[oldest];
        slot.value = value;
        slot.last_update = now.max(newest_stamp.saturating_add(1));
        slot
    }

    /// Stored values, most recently written first.
    #[must_use]
    pub fn values(&self) -> [&str; SLOTS_PER_SUBDOMAIN] {
        let oldest = self.oldest();
        [self.0[1 - oldest].value.as_str(), self.0[oldest].value.as_str()]
    }
}

impl TryFrom<Vec<Slot>> for ChallengeSlots {
    type Error = Error;

    fn try_from(slots: Vec<Slot>) -> Result<Self, Self::Error> {
        let found = slots.len();
        <[Slot; SLOTS_PER_SUBDOMAIN]>::try_from(slots)
            .map(Self)
            .map_err(|_| {
                Error::CorruptRecord(format!(
                    "expected {SLOTS_PER_SUBDOMAIN} challenge slots, found {found}"
                ))
            })
    }
}

/// Create the empty slots for a newly registered subdomain.
pub(crate) async fn insert_slots(
    conn: &mut AnyConnection,
    dialect: Dialect,
    subdomain: &str,
    count: usize,
) -> Result<(), sqlx::Error> {
    let sql = dialect.rewrite("INSERT INTO txt (Subdomain, Value, LastUpdate) VALUES ($1, '', 0)");
    for _ in 0..count {
        sqlx::query(&sql).bind(subdomain).execute(&mut *conn).await?;
    }
    Ok(())
}

pub(crate) async fn count_slots(
    conn: &mut AnyConnection,
    dialect: Dialect,
    subdomain: &str,
) -> Result<usize, sqlx::Error> {
    let sql = dialect.rewrite("SELECT COUNT(*) FROM txt WHERE Subdomain = $1");
    let count: i64 = sqlx::query_scalar::<Any, i64>(&sql)
        .bind(subdomain)
        .fetch_one(&mut *conn)
        .await?;
    Ok(usize::try_from(count).unwrap_or_default())
}

/// Delete every slot of `subdomain` beyond the first two in storage order.
pub(crate) async fn trim_slots(
    conn: &mut AnyConnection,
    dialect: Dialect,
    subdomain: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(&dialect.rewrite(
        "DELETE FROM txt WHERE Subdomain = $1 AND rowid NOT IN (
            SELECT rowid FROM txt WHERE Subdomain = $1 ORDER BY rowid LIMIT 2
         )",
    ))
    .bind(subdomain)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Load the slots of `subdomain`.
///
/// # Errors
///
/// Returns [`Error::NotFound`] when the subdomain has no slots and [`Error::CorruptRecord`]
/// when it has only one.
pub(crate) async fn load_slots(
    conn: &mut AnyConnection,
    dialect: Dialect,
    subdomain: &str,
) -> Result<ChallengeSlots, Error> {
    let rows = sqlx::query_as::<Any, (i64, String, i64)>(&dialect.rewrite(
        "SELECT CAST(rowid AS BIGINT), Value, CAST(COALESCE(LastUpdate, 0) AS BIGINT)
         FROM txt WHERE Subdomain = $1 ORDER BY rowid LIMIT 2",
    ))
    .bind(subdomain)
    .fetch_all(&mut *conn)
    .await?;
    if rows.is_empty() {
        return Err(Error::NotFound(format!("subdomain \"{subdomain}\"")));
    }
    rows.into_iter()
        .map(|(row, value, last_update)| Slot {
            row,
            value,
            last_update,
        })
        .collect::<Vec<_>>()
        .try_into()
}

pub(crate) async fn write_slot(
    conn: &mut AnyConnection,
    dialect: Dialect,
    slot: &Slot,
) -> Result<(), sqlx::Error> {
    sqlx::query(&dialect.rewrite("UPDATE txt SET Value = $1, LastUpdate = $2 WHERE rowid = $3"))
        .bind(slot.value.as_str())
        .bind(slot.last_update)
        .bind(slot.row)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

/// The stored values of `subdomain`, most recently written first.
pub(crate) async fn select_values(
    conn: &mut AnyConnection,
    dialect: Dialect,
    subdomain: &str,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<Any, String>(&dialect.rewrite(
        "SELECT Value FROM txt WHERE Subdomain = $1 ORDER BY LastUpdate DESC, rowid DESC LIMIT 2",
    ))
    .bind(subdomain)
    .fetch_all(&mut *conn)
    .await
}
