//! Investment models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;
use validator::Validate;

use crate::ledger::{Entity, Immutable, RecordMeta};
use crate::models::validate_positive_amount;

/// An investor's commitment of funds to a loan. Never updated once booked;
/// `created_at` doubles as the agreement date.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Investment {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub loan_id: Uuid,
    pub investor_id: Uuid,
    pub amount: Decimal,
}

impl Investment {
    pub fn new(loan_id: Uuid, investor_id: Uuid, amount: Decimal) -> Self {
        Self {
            meta: RecordMeta::new(),
            loan_id,
            investor_id,
            amount,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvestmentFilter {
    pub loan_id: Option<Uuid>,
    pub investor_id: Option<Uuid>,
}

impl Entity for Investment {
    const TABLE: &'static str = "investments";
    type Patch = Immutable;
    type Filter = InvestmentFilter;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(format!(
            "({}, loan_id, investor_id, amount) VALUES (",
            RecordMeta::COLUMNS
        ));
        let mut values = qb.separated(", ");
        self.meta.push_values(&mut values);
        values.push_bind(self.loan_id);
        values.push_bind(self.investor_id);
        values.push_bind(self.amount);
        values.push_unseparated(")");
    }

    fn push_patch_set(patch: &Immutable, _qb: &mut QueryBuilder<'_, Postgres>) {
        match *patch {}
    }

    fn apply_patch(&mut self, patch: &Immutable) -> bool {
        match *patch {}
    }

    fn push_filter(filter: &InvestmentFilter, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(loan_id) = filter.loan_id {
            qb.push(" AND loan_id = ").push_bind(loan_id);
        }
        if let Some(investor_id) = filter.investor_id {
            qb.push(" AND investor_id = ").push_bind(investor_id);
        }
    }

    fn matches(&self, filter: &InvestmentFilter) -> bool {
        filter.loan_id.map_or(true, |id| self.loan_id == id)
            && filter.investor_id.map_or(true, |id| self.investor_id == id)
    }
}

/// Request to place an investment; the investor comes from the caller identity
#[derive(Debug, Deserialize, Validate)]
pub struct CreateInvestmentRequest {
    pub loan_id: Uuid,
    #[validate(custom = "validate_positive_amount")]
    pub amount: Decimal,
}

/// Query for listing a loan's investments
#[derive(Debug, Deserialize)]
pub struct ListInvestmentsQuery {
    pub loan_id: Uuid,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

/// Funding agreement document data
#[derive(Debug, Clone, Serialize)]
pub struct FundingAgreement {
    pub agreement_id: Uuid,
    pub agreement_date: DateTime<Utc>,
    pub amount: Decimal,
    pub roi: Decimal,
    pub loan_id: Uuid,
    pub investor_name: String,
    pub borrower_name: String,
}
