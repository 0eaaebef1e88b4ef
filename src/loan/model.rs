//! Loan models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use crate::ledger::{Entity, RecordMeta};
use crate::models::validate_positive_amount;

/// Loan lifecycle state
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "loan_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanState {
    Proposed,
    Approved,
    Rejected,
    Invested,
    Disbursed,
}

impl LoanState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanState::Proposed => "proposed",
            LoanState::Approved => "approved",
            LoanState::Rejected => "rejected",
            LoanState::Invested => "invested",
            LoanState::Disbursed => "disbursed",
        }
    }

    /// Forward-only transitions; rejected and disbursed are terminal
    pub fn can_transition_to(self, next: LoanState) -> bool {
        matches!(
            (self, next),
            (LoanState::Proposed, LoanState::Approved)
                | (LoanState::Proposed, LoanState::Rejected)
                | (LoanState::Approved, LoanState::Invested)
                | (LoanState::Invested, LoanState::Disbursed)
        )
    }
}

impl fmt::Display for LoanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field validation recorded at approval
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct ApprovalDetails {
    pub validator_employee_id: Option<Uuid>,
    pub visit_proof_picture_url: Option<String>,
    pub approval_date: Option<DateTime<Utc>>,
}

/// Hand-over of funds recorded at disbursement
#[derive(Debug, Clone, Default, PartialEq, Serialize, sqlx::FromRow)]
pub struct DisbursementDetails {
    pub officer_employee_id: Option<Uuid>,
    pub signed_agreement_url: Option<String>,
    pub disbursement_date: Option<DateTime<Utc>>,
}

/// Loan model
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Loan {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub borrower_id: Uuid,
    pub principal_amount: Decimal,
    pub rate: Decimal,
    pub roi: Decimal,
    pub state: LoanState,
    pub agreement_letter_url: String,
    pub reject_reason: Option<String>,
    #[sqlx(flatten)]
    pub approval: ApprovalDetails,
    #[sqlx(flatten)]
    pub disbursement: DisbursementDetails,
}

impl Loan {
    /// A freshly proposed loan
    pub fn new(
        borrower_id: Uuid,
        principal_amount: Decimal,
        rate: Decimal,
        roi: Decimal,
        agreement_letter_url: impl Into<String>,
    ) -> Self {
        Self {
            meta: RecordMeta::new(),
            borrower_id,
            principal_amount,
            rate,
            roi,
            state: LoanState::Proposed,
            agreement_letter_url: agreement_letter_url.into(),
            reject_reason: None,
            approval: ApprovalDetails::default(),
            disbursement: DisbursementDetails::default(),
        }
    }
}

/// Sparse loan update. `expected_state` turns the update into a
/// compare-and-set on the current state.
#[derive(Debug, Clone, Default)]
pub struct LoanPatch {
    pub expected_state: Option<LoanState>,
    pub state: Option<LoanState>,
    pub reject_reason: Option<String>,
    pub approval: Option<ApprovalDetails>,
    pub disbursement: Option<DisbursementDetails>,
}

impl LoanPatch {
    pub fn transition(from: LoanState, to: LoanState) -> Self {
        Self {
            expected_state: Some(from),
            state: Some(to),
            ..Default::default()
        }
    }

    pub fn with_reject_reason(mut self, reason: impl Into<String>) -> Self {
        self.reject_reason = Some(reason.into());
        self
    }

    pub fn with_approval(mut self, approval: ApprovalDetails) -> Self {
        self.approval = Some(approval);
        self
    }

    pub fn with_disbursement(mut self, disbursement: DisbursementDetails) -> Self {
        self.disbursement = Some(disbursement);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    pub state: Option<LoanState>,
    pub borrower_id: Option<Uuid>,
}

impl Entity for Loan {
    const TABLE: &'static str = "loans";
    type Patch = LoanPatch;
    type Filter = LoanFilter;

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn push_insert(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(format!(
            "({}, borrower_id, principal_amount, rate, roi, state, agreement_letter_url, \
             reject_reason, validator_employee_id, visit_proof_picture_url, approval_date, \
             officer_employee_id, signed_agreement_url, disbursement_date) VALUES (",
            RecordMeta::COLUMNS
        ));
        let mut values = qb.separated(", ");
        self.meta.push_values(&mut values);
        values.push_bind(self.borrower_id);
        values.push_bind(self.principal_amount);
        values.push_bind(self.rate);
        values.push_bind(self.roi);
        values.push_bind(self.state);
        values.push_bind(self.agreement_letter_url.clone());
        values.push_bind(self.reject_reason.clone());
        values.push_bind(self.approval.validator_employee_id);
        values.push_bind(self.approval.visit_proof_picture_url.clone());
        values.push_bind(self.approval.approval_date);
        values.push_bind(self.disbursement.officer_employee_id);
        values.push_bind(self.disbursement.signed_agreement_url.clone());
        values.push_bind(self.disbursement.disbursement_date);
        values.push_unseparated(")");
    }

    fn push_patch_set(patch: &LoanPatch, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(state) = patch.state {
            qb.push(", state = ").push_bind(state);
        }
        if let Some(reason) = &patch.reject_reason {
            qb.push(", reject_reason = ").push_bind(reason.clone());
        }
        if let Some(approval) = &patch.approval {
            qb.push(", validator_employee_id = ")
                .push_bind(approval.validator_employee_id);
            qb.push(", visit_proof_picture_url = ")
                .push_bind(approval.visit_proof_picture_url.clone());
            qb.push(", approval_date = ").push_bind(approval.approval_date);
        }
        if let Some(disbursement) = &patch.disbursement {
            qb.push(", officer_employee_id = ")
                .push_bind(disbursement.officer_employee_id);
            qb.push(", signed_agreement_url = ")
                .push_bind(disbursement.signed_agreement_url.clone());
            qb.push(", disbursement_date = ")
                .push_bind(disbursement.disbursement_date);
        }
    }

    fn push_patch_guard(patch: &LoanPatch, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(expected) = patch.expected_state {
            qb.push(" AND state = ").push_bind(expected);
        }
    }

    fn apply_patch(&mut self, patch: &LoanPatch) -> bool {
        if patch.expected_state.is_some_and(|expected| expected != self.state) {
            return false;
        }

        if let Some(state) = patch.state {
            self.state = state;
        }
        if let Some(reason) = &patch.reject_reason {
            self.reject_reason = Some(reason.clone());
        }
        if let Some(approval) = &patch.approval {
            self.approval = approval.clone();
        }
        if let Some(disbursement) = &patch.disbursement {
            self.disbursement = disbursement.clone();
        }
        true
    }

    fn push_filter(filter: &LoanFilter, qb: &mut QueryBuilder<'_, Postgres>) {
        if let Some(state) = filter.state {
            qb.push(" AND state = ").push_bind(state);
        }
        if let Some(borrower_id) = filter.borrower_id {
            qb.push(" AND borrower_id = ").push_bind(borrower_id);
        }
    }

    fn matches(&self, filter: &LoanFilter) -> bool {
        filter.state.map_or(true, |state| self.state == state)
            && filter
                .borrower_id
                .map_or(true, |borrower_id| self.borrower_id == borrower_id)
    }
}

/// Request to propose a new loan
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    pub borrower_id: Uuid,
    #[validate(custom = "validate_positive_amount")]
    pub principal_amount: Decimal,
    pub rate: Decimal,
    pub roi: Decimal,
    #[validate(url)]
    pub agreement_letter_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectLoanRequest {
    #[validate(length(min = 1))]
    pub reject_reason: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveLoanRequest {
    pub validator_employee_id: Uuid,
    #[validate(url)]
    pub visit_proof_picture_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct DisburseLoanRequest {
    pub officer_employee_id: Uuid,
    #[validate(url)]
    pub signed_agreement_url: String,
    pub disbursement_date: DateTime<Utc>,
}

/// Query for listing loans
#[derive(Debug, Default, Deserialize)]
pub struct ListLoansQuery {
    pub state: Option<LoanState>,
    pub borrower_id: Option<Uuid>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListLoansQuery {
    pub fn filter(&self) -> LoanFilter {
        LoanFilter {
            state: self.state,
            borrower_id: self.borrower_id,
        }
    }
}

/// Loan agreement document data
#[derive(Debug, Clone, Serialize)]
pub struct LoanAgreement {
    pub loan_id: Uuid,
    pub principal_amount: Decimal,
    pub interest_rate: Decimal,
    pub borrower_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn loan() -> Loan {
        Loan::new(
            Uuid::new_v4(),
            dec!(1000),
            dec!(0.12),
            dec!(0.10),
            "https://docs.example.com/letter.pdf",
        )
    }

    #[test]
    fn test_transitions_are_forward_only() {
        use LoanState::*;

        assert!(Proposed.can_transition_to(Approved));
        assert!(Proposed.can_transition_to(Rejected));
        assert!(Approved.can_transition_to(Invested));
        assert!(Invested.can_transition_to(Disbursed));

        assert!(!Approved.can_transition_to(Proposed));
        assert!(!Invested.can_transition_to(Approved));
        assert!(!Rejected.can_transition_to(Approved));
        assert!(!Disbursed.can_transition_to(Invested));
        assert!(!Approved.can_transition_to(Approved));
    }

    #[test]
    fn test_patch_with_stale_expected_state_is_rejected() {
        let mut loan = loan();
        let patch = LoanPatch::transition(LoanState::Approved, LoanState::Invested);

        assert!(!loan.apply_patch(&patch));
        assert_eq!(loan.state, LoanState::Proposed);

        let patch = LoanPatch::transition(LoanState::Proposed, LoanState::Rejected)
            .with_reject_reason("incomplete documents");
        assert!(loan.apply_patch(&patch));
        assert_eq!(loan.state, LoanState::Rejected);
        assert_eq!(loan.reject_reason.as_deref(), Some("incomplete documents"));
    }

    #[test]
    fn test_filter_matches() {
        let loan = loan();
        assert!(loan.matches(&LoanFilter::default()));
        assert!(loan.matches(&LoanFilter {
            state: Some(LoanState::Proposed),
            borrower_id: Some(loan.borrower_id),
        }));
        assert!(!loan.matches(&LoanFilter {
            state: Some(LoanState::Approved),
            borrower_id: None,
        }));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&LoanState::Invested).unwrap();
        assert_eq!(json, "\"invested\"");
    }
}
