//! Participant records and API envelopes shared across the lending backend

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use validator::ValidationError;

use crate::ledger::{Entity, Immutable, RecordMeta};

/// Investor account holding the balance investments are paid from
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Investor {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub full_name: String,
    pub email: String,
    pub balance: Decimal,
}

impl Investor {
    pub fn new(full_name: impl Into<String>, email: impl Into<String>, balance: Decimal) -> Self {
        Self {
            meta: RecordMeta::new(),
            full_name: full_name.into(),
            email: email.into(),
            balance,
        }
    }
}

/// Sparse investor update. A debit only applies while the balance covers it.
#[derive(Debug, Clone, Default)]
pub struct InvestorPatch {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub debit: Option<Decimal>,
}

impl InvestorPatch {
    pub fn debit(amount: Decimal) -> Self {
        Self {
            debit: Some(amount),
            ..Default::default()
        }
    }
}

impl Entity for Investor {
    const TABLE: &'static str = "investors";
    type Patch = InvestorPatch;
    type Filter = ();

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(format!(
            "({}, full_name, email, balance) VALUES (",
            RecordMeta::COLUMNS
        ));
        let mut values = qb.separated(", ");
        self.meta.push_values(&mut values);
        values.push_bind(self.full_name.clone());
        values.push_bind(self.email.clone());
        values.push_bind(self.balance);
        values.push_unseparated(")");
    }

    fn push_patch_set(patch: &InvestorPatch, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(full_name) = &patch.full_name {
            qb.push(", full_name = ").push_bind(full_name.clone());
        }
        if let Some(email) = &patch.email {
            qb.push(", email = ").push_bind(email.clone());
        }
        if let Some(amount) = patch.debit {
            qb.push(", balance = balance - ").push_bind(amount);
        }
    }

    fn push_patch_guard(patch: &InvestorPatch, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(amount) = patch.debit {
            qb.push(" AND balance >= ").push_bind(amount);
        }
    }

    fn apply_patch(&mut self, patch: &InvestorPatch) -> bool {
        let balance = match patch.debit {
            Some(amount) if self.balance < amount => return false,
            Some(amount) => self.balance - amount,
            None => self.balance,
        };

        if let Some(full_name) = &patch.full_name {
            self.full_name = full_name.clone();
        }
        if let Some(email) = &patch.email {
            self.email = email.clone();
        }
        self.balance = balance;
        true
    }
}

/// Borrower receiving loan proceeds
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Borrower {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub full_name: String,
    pub id_card_number: String,
    pub address: String,
    pub phone_number: String,
    pub email: String,
    pub status: String,
}

impl Borrower {
    pub fn new(full_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            full_name: full_name.into(),
            id_card_number: String::new(),
            address: String::new(),
            phone_number: String::new(),
            email: email.into(),
            status: "active".to_string(),
        }
    }
}

impl Entity for Borrower {
    const TABLE: &'static str = "borrowers";
    type Patch = Immutable;
    type Filter = ();

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(format!(
            "({}, full_name, id_card_number, address, phone_number, email, status) VALUES (",
            RecordMeta::COLUMNS
        ));
        let mut values = qb.separated(", ");
        self.meta.push_values(&mut values);
        values.push_bind(self.full_name.clone());
        values.push_bind(self.id_card_number.clone());
        values.push_bind(self.address.clone());
        values.push_bind(self.phone_number.clone());
        values.push_bind(self.email.clone());
        values.push_bind(self.status.clone());
        values.push_unseparated(")");
    }

    fn push_patch_set(patch: &Immutable, _qb: &mut QueryBuilder<'_, Postgres>) {
        match *patch {}
    }

    fn apply_patch(&mut self, patch: &Immutable) -> bool {
        match *patch {}
    }
}

/// Staff member acting as field validator or disbursement officer
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Employee {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub full_name: String,
    pub email: String,
}

impl Employee {
    pub fn new(full_name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            meta: RecordMeta::new(),
            full_name: full_name.into(),
            email: email.into(),
        }
    }
}

impl Entity for Employee {
    const TABLE: &'static str = "employees";
    type Patch = Immutable;
    type Filter = ();

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(format!("({}, full_name, email) VALUES (", RecordMeta::COLUMNS));
        let mut values = qb.separated(", ");
        self.meta.push_values(&mut values);
        values.push_bind(self.full_name.clone());
        values.push_bind(self.email.clone());
        values.push_unseparated(")");
    }

    fn push_patch_set(patch: &Immutable, _qb: &mut QueryBuilder<'_, Postgres>) {
        match *patch {}
    }

    fn apply_patch(&mut self, patch: &Immutable) -> bool {
        match *patch {}
    }
}

/// Decimal places stored for money columns (`NUMERIC(20, 2)`)
pub const MONEY_SCALE: u32 = 2;

/// A positive amount the money columns store without rounding
pub fn is_storable_amount(amount: &Decimal) -> bool {
    amount.is_sign_positive() && !amount.is_zero() && amount.normalize().scale() <= MONEY_SCALE
}

/// Rejects zero, negative and sub-cent money amounts
pub fn validate_positive_amount(amount: &Decimal) -> Result<(), ValidationError> {
    if !amount.is_sign_positive() || amount.is_zero() {
        return Err(ValidationError::new("amount must be greater than 0"));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(ValidationError::new("amount must have at most 2 decimal places"));
    }
    Ok(())
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

/// Pagination query parameters
#[derive(Debug, Default, Deserialize)]
pub struct PaginationParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}
