//! Ledger store for lending records
//!
//! Durable storage for loans, investors, investments, borrowers and employees.
//! The [`Ledger`] trait is generic over [`Entity`], so a single set of
//! operations serves every table while the entity-specific rules (capacity,
//! balance) stay in the services that own them.
//!
//! Two backends share the same semantics:
//! - [`PgLedger`]: PostgreSQL through sqlx, row locks via `SELECT ... FOR UPDATE`
//! - [`MemoryLedger`]: in-process tables with per-row async mutexes, used by
//!   tests and local runs

mod memory;
mod postgres;

pub use memory::{MemoryLedger, MemoryTx};
pub use postgres::PgLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

/// Storage-level failures. Business-rule violations never show up here.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Stored record is corrupted: {0}")]
    Corrupted(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Database(e.to_string())
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Identity and bookkeeping columns carried by every table
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RecordMeta {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl RecordMeta {
    pub const COLUMNS: &'static str = "id, created_at, updated_at, deleted_at";

    /// Fresh metadata for a record that has not been stored yet
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Bind values matching [`RecordMeta::COLUMNS`]
    pub fn push_values<'qb, 'args: 'qb>(
        &self,
        values: &mut Separated<'qb, 'args, Postgres, &'static str>,
    ) {
        values.push_bind(self.id);
        values.push_bind(self.created_at);
        values.push_bind(self.updated_at);
        values.push_bind(self.deleted_at);
    }
}

impl Default for RecordMeta {
    fn default() -> Self {
        Self::new()
    }
}

/// A record type the ledger knows how to store.
///
/// Implementors describe their table, how to render inserts, patches and
/// filters as SQL, and how to apply the same patches and filters in memory.
/// The two renderings must agree; the backend tests exercise both.
pub trait Entity:
    for<'r> sqlx::FromRow<'r, PgRow> + Clone + Send + Sync + Unpin + 'static
{
    const TABLE: &'static str;

    /// Sparse update enumerating the legal mutable fields
    type Patch: Send + Sync + 'static;

    /// Listing filter
    type Filter: Default + Send + Sync + 'static;

    fn meta(&self) -> &RecordMeta;

    fn id(&self) -> Uuid {
        self.meta().id
    }

    fn meta_mut(&mut self) -> &mut RecordMeta;

    /// Push `(columns) VALUES (binds)` for an insert
    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>);

    /// Push `, column = value` assignments for a patch
    fn push_patch_set(patch: &Self::Patch, qb: &mut QueryBuilder<'_, Postgres>);

    /// Push ` AND ...` guard conditions for a patch. Most patches have none.
    fn push_patch_guard(_patch: &Self::Patch, _qb: &mut QueryBuilder<'_, Postgres>) {}

    /// Apply a patch in place. Returns false, leaving `self` untouched, when a
    /// guard rejects it.
    fn apply_patch(&mut self, patch: &Self::Patch) -> bool;

    /// Push ` AND ...` conditions for a listing filter
    fn push_filter(_filter: &Self::Filter, _qb: &mut QueryBuilder<'_, Postgres>) {}

    fn matches(&self, _filter: &Self::Filter) -> bool {
        true
    }
}

/// Patch type for append-only records. It has no values, so an update
/// against such a table cannot be written.
#[derive(Debug, Clone, Copy)]
pub enum Immutable {}

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// Build a page from `limit + 1` fetched rows
    pub fn from_overfetch(mut rows: Vec<T>, page: u32, limit: u32) -> Self {
        let has_next = rows.len() > limit as usize;
        rows.truncate(limit as usize);
        Self {
            data: rows,
            has_next,
            has_prev: page > 1,
        }
    }
}

/// Normalize page/limit query values: page starts at 1, limit is 1..=100
pub fn page_bounds(page: Option<u32>, limit: Option<u32>) -> (u32, u32) {
    let page = page.unwrap_or(1).max(1);
    let limit = limit.unwrap_or(20).clamp(1, 100);
    (page, limit)
}

/// Storage operations shared by all entities.
///
/// Methods taking `&mut Self::Tx` run inside that transaction; locking
/// reads therefore cannot be issued without one. Dropping a transaction
/// handle without committing rolls it back.
#[async_trait]
pub trait Ledger: Send + Sync + 'static {
    type Tx: Send;

    async fn begin(&self) -> LedgerResult<Self::Tx>;

    async fn commit(&self, tx: Self::Tx) -> LedgerResult<()>;

    async fn rollback(&self, tx: Self::Tx) -> LedgerResult<()>;

    async fn get_by_id<E: Entity>(&self, id: Uuid) -> LedgerResult<Option<E>>;

    /// Read a row and hold an exclusive lock on it until `tx` ends.
    /// Concurrent lockers of the same row wait.
    async fn get_by_id_with_lock<E: Entity>(
        &self,
        id: Uuid,
        tx: &mut Self::Tx,
    ) -> LedgerResult<Option<E>>;

    async fn get_by_ids<E: Entity>(&self, ids: &[Uuid]) -> LedgerResult<Vec<E>>;

    async fn paginate<E: Entity>(
        &self,
        filter: E::Filter,
        page: u32,
        limit: u32,
    ) -> LedgerResult<Page<E>>;

    async fn create<E: Entity>(&self, model: E) -> LedgerResult<E>;

    async fn create_in_tx<E: Entity>(&self, model: E, tx: &mut Self::Tx) -> LedgerResult<E>;

    async fn create_bulk<E: Entity>(&self, models: Vec<E>) -> LedgerResult<()>;

    /// Apply a patch outside any caller transaction. `Ok(None)` when the row
    /// is absent or a patch guard rejected the change.
    async fn update_fields<E: Entity>(&self, id: Uuid, patch: E::Patch)
        -> LedgerResult<Option<E>>;

    async fn update_fields_in_tx<E: Entity>(
        &self,
        id: Uuid,
        patch: E::Patch,
        tx: &mut Self::Tx,
    ) -> LedgerResult<Option<E>>;

    /// Mark a row deleted. Returns false when it was already absent.
    async fn soft_delete<E: Entity>(&self, id: Uuid) -> LedgerResult<bool>;

    /// Sum of live investment amounts for a loan, read through `tx`
    async fn total_invested_in_tx(&self, loan_id: Uuid, tx: &mut Self::Tx)
        -> LedgerResult<Decimal>;

    /// Connectivity probe for health checks
    async fn ping(&self) -> LedgerResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_from_overfetch() {
        let page = Page::from_overfetch(vec![1, 2, 3], 1, 2);
        assert_eq!(page.data, vec![1, 2]);
        assert!(page.has_next);
        assert!(!page.has_prev);

        let page = Page::from_overfetch(vec![1], 3, 2);
        assert_eq!(page.data, vec![1]);
        assert!(!page.has_next);
        assert!(page.has_prev);
    }

    #[test]
    fn test_page_bounds() {
        assert_eq!(page_bounds(None, None), (1, 20));
        assert_eq!(page_bounds(Some(0), Some(0)), (1, 1));
        assert_eq!(page_bounds(Some(4), Some(500)), (4, 100));
    }
}
