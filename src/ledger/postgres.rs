//! PostgreSQL ledger backend

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction};
use uuid::Uuid;

use super::{Entity, Ledger, LedgerError, LedgerResult, Page};
use crate::db;
use crate::investment::Investment;

/// Ledger backed by a sqlx connection pool
#[derive(Clone)]
pub struct PgLedger {
    pool: PgPool,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `UPDATE <table> SET updated_at = now, <patch> WHERE id = .. AND <guards> RETURNING *`
fn build_update<'a, E: Entity>(id: Uuid, patch: &E::Patch) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("UPDATE {} SET updated_at = ", E::TABLE));
    qb.push_bind(Utc::now());
    E::push_patch_set(patch, &mut qb);
    qb.push(" WHERE id = ");
    qb.push_bind(id);
    qb.push(" AND deleted_at IS NULL");
    E::push_patch_guard(patch, &mut qb);
    qb.push(" RETURNING *");
    qb
}

fn build_insert<'a, E: Entity>(model: &E) -> QueryBuilder<'a, Postgres> {
    let mut qb = QueryBuilder::new(format!("INSERT INTO {} ", E::TABLE));
    model.push_insert(&mut qb);
    qb.push(" RETURNING *");
    qb
}

#[async_trait]
impl Ledger for PgLedger {
    type Tx = Transaction<'static, Postgres>;

    async fn begin(&self) -> LedgerResult<Self::Tx> {
        Ok(self.pool.begin().await?)
    }

    async fn commit(&self, tx: Self::Tx) -> LedgerResult<()> {
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(&self, tx: Self::Tx) -> LedgerResult<()> {
        tx.rollback().await?;
        Ok(())
    }

    async fn get_by_id<E: Entity>(&self, id: Uuid) -> LedgerResult<Option<E>> {
        let sql = format!(
            "SELECT * FROM {} WHERE id = $1 AND deleted_at IS NULL",
            E::TABLE
        );
        let row = sqlx::query_as::<_, E>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    async fn get_by_id_with_lock<E: Entity>(
        &self,
        id: Uuid,
        tx: &mut Self::Tx,
    ) -> LedgerResult<Option<E>> {
        let sql = format!(
            "SELECT * FROM {} WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
            E::TABLE
        );
        let row = sqlx::query_as::<_, E>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;

        Ok(row)
    }

    async fn get_by_ids<E: Entity>(&self, ids: &[Uuid]) -> LedgerResult<Vec<E>> {
        let sql = format!(
            "SELECT * FROM {} WHERE id = ANY($1) AND deleted_at IS NULL",
            E::TABLE
        );
        let rows = sqlx::query_as::<_, E>(&sql)
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    async fn paginate<E: Entity>(
        &self,
        filter: E::Filter,
        page: u32,
        limit: u32,
    ) -> LedgerResult<Page<E>> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT * FROM {} WHERE deleted_at IS NULL",
            E::TABLE
        ));
        E::push_filter(&filter, &mut qb);
        qb.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        qb.push_bind(i64::from(limit) + 1);
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(page.saturating_sub(1)) * i64::from(limit));

        let rows = qb.build_query_as::<E>().fetch_all(&self.pool).await?;

        Ok(Page::from_overfetch(rows, page, limit))
    }

    async fn create<E: Entity>(&self, model: E) -> LedgerResult<E> {
        let mut qb = build_insert(&model);
        let created = qb.build_query_as::<E>().fetch_one(&self.pool).await?;

        Ok(created)
    }

    async fn create_in_tx<E: Entity>(&self, model: E, tx: &mut Self::Tx) -> LedgerResult<E> {
        let mut qb = build_insert(&model);
        let created = qb.build_query_as::<E>().fetch_one(&mut **tx).await?;

        Ok(created)
    }

    async fn create_bulk<E: Entity>(&self, models: Vec<E>) -> LedgerResult<()> {
        let mut tx = self.pool.begin().await?;
        for model in &models {
            let mut qb = build_insert(model);
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;

        Ok(())
    }

    async fn update_fields<E: Entity>(
        &self,
        id: Uuid,
        patch: E::Patch,
    ) -> LedgerResult<Option<E>> {
        let mut qb = build_update::<E>(id, &patch);
        let updated = qb.build_query_as::<E>().fetch_optional(&self.pool).await?;

        Ok(updated)
    }

    async fn update_fields_in_tx<E: Entity>(
        &self,
        id: Uuid,
        patch: E::Patch,
        tx: &mut Self::Tx,
    ) -> LedgerResult<Option<E>> {
        let mut qb = build_update::<E>(id, &patch);
        let updated = qb.build_query_as::<E>().fetch_optional(&mut **tx).await?;

        Ok(updated)
    }

    async fn soft_delete<E: Entity>(&self, id: Uuid) -> LedgerResult<bool> {
        let sql = format!(
            "UPDATE {} SET deleted_at = $1, updated_at = $1 WHERE id = $2 AND deleted_at IS NULL",
            E::TABLE
        );
        let result = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn total_invested_in_tx(
        &self,
        loan_id: Uuid,
        tx: &mut Self::Tx,
    ) -> LedgerResult<Decimal> {
        let sql = format!(
            "SELECT COALESCE(SUM(amount), 0) FROM {} WHERE loan_id = $1 AND deleted_at IS NULL",
            Investment::TABLE
        );
        let total = sqlx::query_scalar::<_, Decimal>(&sql)
            .bind(loan_id)
            .fetch_one(&mut **tx)
            .await?;

        Ok(total)
    }

    async fn ping(&self) -> LedgerResult<()> {
        db::check_health(&self.pool)
            .await
            .map_err(|e| LedgerError::Database(e.to_string()))
    }
}
