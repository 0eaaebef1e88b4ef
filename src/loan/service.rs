//! Loan service layer - lifecycle operations outside of funding
//!
//! State changes here are guarded patches: each carries the state it expects
//! to find, so a concurrent booking or lifecycle call cannot be overwritten.

use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::{
    ApprovalDetails, ApproveLoanRequest, CreateLoanRequest, DisburseLoanRequest,
    DisbursementDetails, Loan, LoanAgreement, LoanFilter, LoanPatch, LoanState,
};
use crate::error::LendingError;
use crate::ledger::{Ledger, Page};
use crate::models::{is_storable_amount, Borrower, Employee};

/// Loan service for managing loan lifecycle
pub struct LoanService<L: Ledger> {
    ledger: Arc<L>,
}

impl<L: Ledger> LoanService<L> {
    pub fn new(ledger: Arc<L>) -> Self {
        Self { ledger }
    }

    /// Propose a new loan for an existing borrower
    pub async fn create_loan(&self, request: CreateLoanRequest) -> Result<Loan, LendingError> {
        if !is_storable_amount(&request.principal_amount) {
            return Err(LendingError::InvalidState(
                "principal amount must be greater than 0 with at most 2 decimal places",
            ));
        }

        self.ledger
            .get_by_id::<Borrower>(request.borrower_id)
            .await?
            .ok_or(LendingError::NotFound("borrower not found"))?;

        let loan = self
            .ledger
            .create(Loan::new(
                request.borrower_id,
                request.principal_amount,
                request.rate,
                request.roi,
                request.agreement_letter_url,
            ))
            .await?;

        info!(loan_id = %loan.meta.id, borrower_id = %loan.borrower_id, "Loan proposed");
        Ok(loan)
    }

    pub async fn reject_loan(&self, loan_id: Uuid, reason: String) -> Result<Loan, LendingError> {
        const NOT_PROPOSED: &str = "loan is not in proposed state";

        let loan = self.get_loan(loan_id).await?;
        if !loan.state.can_transition_to(LoanState::Rejected) {
            return Err(LendingError::InvalidState(NOT_PROPOSED));
        }

        let patch = LoanPatch::transition(loan.state, LoanState::Rejected)
            .with_reject_reason(reason);
        let loan = self
            .ledger
            .update_fields::<Loan>(loan_id, patch)
            .await?
            .ok_or(LendingError::InvalidState(NOT_PROPOSED))?;

        info!(loan_id = %loan_id, "Loan rejected");
        Ok(loan)
    }

    pub async fn approve_loan(
        &self,
        loan_id: Uuid,
        request: ApproveLoanRequest,
    ) -> Result<Loan, LendingError> {
        const NOT_PROPOSED: &str = "loan is not in proposed state";

        let loan = self.get_loan(loan_id).await?;
        if !loan.state.can_transition_to(LoanState::Approved) {
            return Err(LendingError::InvalidState(NOT_PROPOSED));
        }

        self.ledger
            .get_by_id::<Employee>(request.validator_employee_id)
            .await?
            .ok_or(LendingError::NotFound("validator employee not found"))?;

        let patch = LoanPatch::transition(loan.state, LoanState::Approved).with_approval(
            ApprovalDetails {
                validator_employee_id: Some(request.validator_employee_id),
                visit_proof_picture_url: Some(request.visit_proof_picture_url),
                approval_date: Some(Utc::now()),
            },
        );
        let loan = self
            .ledger
            .update_fields::<Loan>(loan_id, patch)
            .await?
            .ok_or(LendingError::InvalidState(NOT_PROPOSED))?;

        info!(
            loan_id = %loan_id,
            validator_employee_id = %request.validator_employee_id,
            "Loan approved"
        );
        Ok(loan)
    }

    pub async fn disburse_loan(
        &self,
        loan_id: Uuid,
        request: DisburseLoanRequest,
    ) -> Result<Loan, LendingError> {
        const NOT_INVESTED: &str = "loan is not in invested state";

        let loan = self.get_loan(loan_id).await?;
        if !loan.state.can_transition_to(LoanState::Disbursed) {
            return Err(LendingError::InvalidState(NOT_INVESTED));
        }

        self.ledger
            .get_by_id::<Employee>(request.officer_employee_id)
            .await?
            .ok_or(LendingError::NotFound("officer employee not found"))?;

        let patch = LoanPatch::transition(loan.state, LoanState::Disbursed)
            .with_disbursement(DisbursementDetails {
                officer_employee_id: Some(request.officer_employee_id),
                signed_agreement_url: Some(request.signed_agreement_url),
                disbursement_date: Some(request.disbursement_date),
            });
        let loan = self
            .ledger
            .update_fields::<Loan>(loan_id, patch)
            .await?
            .ok_or(LendingError::InvalidState(NOT_INVESTED))?;

        info!(
            loan_id = %loan_id,
            officer_employee_id = %request.officer_employee_id,
            "Loan disbursed"
        );
        Ok(loan)
    }

    pub async fn get_loan(&self, loan_id: Uuid) -> Result<Loan, LendingError> {
        self.ledger
            .get_by_id::<Loan>(loan_id)
            .await?
            .ok_or(LendingError::NotFound("loan not found"))
    }

    pub async fn list_loans(
        &self,
        filter: LoanFilter,
        page: u32,
        limit: u32,
    ) -> Result<Page<Loan>, LendingError> {
        Ok(self.ledger.paginate::<Loan>(filter, page, limit).await?)
    }

    /// Agreement data exists only once a loan has been fully funded
    pub async fn get_loan_agreement(&self, loan_id: Uuid) -> Result<LoanAgreement, LendingError> {
        let loan = self.get_loan(loan_id).await?;
        if matches!(loan.state, LoanState::Proposed | LoanState::Approved) {
            return Err(LendingError::NotFound("loan not found"));
        }

        let borrower = self
            .ledger
            .get_by_id::<Borrower>(loan.borrower_id)
            .await?
            .ok_or(LendingError::NotFound("borrower not found"))?;

        Ok(LoanAgreement {
            loan_id: loan.meta.id,
            principal_amount: loan.principal_amount,
            interest_rate: loan.rate,
            borrower_name: borrower.full_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use rust_decimal_macros::dec;

    async fn setup() -> (LoanService<MemoryLedger>, Arc<MemoryLedger>, Borrower, Employee) {
        let ledger = Arc::new(MemoryLedger::new());
        let borrower = ledger
            .create(Borrower::new("Budi", "budi@example.com"))
            .await
            .unwrap();
        let employee = ledger
            .create(Employee::new("Sari", "sari@example.com"))
            .await
            .unwrap();
        (LoanService::new(ledger.clone()), ledger, borrower, employee)
    }

    fn create_request(borrower_id: Uuid) -> CreateLoanRequest {
        CreateLoanRequest {
            borrower_id,
            principal_amount: dec!(5000000),
            rate: dec!(0.12),
            roi: dec!(0.10),
            agreement_letter_url: "https://docs.example.com/letter.pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_requires_borrower() {
        let (service, _, _, _) = setup().await;
        let err = service
            .create_loan(create_request(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, LendingError::NotFound("borrower not found")));
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (service, ledger, borrower, employee) = setup().await;
        let loan = service.create_loan(create_request(borrower.meta.id)).await.unwrap();
        assert_eq!(loan.state, LoanState::Proposed);

        let approved = service
            .approve_loan(
                loan.meta.id,
                ApproveLoanRequest {
                    validator_employee_id: employee.meta.id,
                    visit_proof_picture_url: "https://img.example.com/visit.jpg".to_string(),
                },
            )
            .await
            .unwrap();
        assert_eq!(approved.state, LoanState::Approved);
        assert_eq!(approved.approval.validator_employee_id, Some(employee.meta.id));
        assert!(approved.approval.approval_date.is_some());

        // Not funded yet: no agreement and no disbursement
        assert!(matches!(
            service.get_loan_agreement(loan.meta.id).await,
            Err(LendingError::NotFound("loan not found"))
        ));
        let disburse = || DisburseLoanRequest {
            officer_employee_id: employee.meta.id,
            signed_agreement_url: "https://docs.example.com/signed.pdf".to_string(),
            disbursement_date: Utc::now(),
        };
        assert!(matches!(
            service.disburse_loan(loan.meta.id, disburse()).await,
            Err(LendingError::InvalidState("loan is not in invested state"))
        ));

        ledger
            .update_fields::<Loan>(
                loan.meta.id,
                LoanPatch::transition(LoanState::Approved, LoanState::Invested),
            )
            .await
            .unwrap()
            .unwrap();

        let agreement = service.get_loan_agreement(loan.meta.id).await.unwrap();
        assert_eq!(agreement.borrower_name, "Budi");
        assert_eq!(agreement.principal_amount, dec!(5000000));

        let disbursed = service.disburse_loan(loan.meta.id, disburse()).await.unwrap();
        assert_eq!(disbursed.state, LoanState::Disbursed);
        assert_eq!(disbursed.disbursement.officer_employee_id, Some(employee.meta.id));
    }

    #[tokio::test]
    async fn test_reject_only_from_proposed() {
        let (service, _, borrower, employee) = setup().await;
        let loan = service.create_loan(create_request(borrower.meta.id)).await.unwrap();

        let rejected = service
            .reject_loan(loan.meta.id, "incomplete documents".to_string())
            .await
            .unwrap();
        assert_eq!(rejected.state, LoanState::Rejected);

        let err = service
            .approve_loan(
                loan.meta.id,
                ApproveLoanRequest {
                    validator_employee_id: employee.meta.id,
                    visit_proof_picture_url: "https://img.example.com/visit.jpg".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LendingError::InvalidState("loan is not in proposed state")
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_sub_cent_principal() {
        let (service, _, borrower, _) = setup().await;
        let mut request = create_request(borrower.meta.id);
        request.principal_amount = dec!(999.995);

        let err = service.create_loan(request).await.unwrap_err();
        assert!(matches!(err, LendingError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_terminal_states_allow_no_transition() {
        let (service, _, borrower, employee) = setup().await;
        let loan = service.create_loan(create_request(borrower.meta.id)).await.unwrap();
        service
            .reject_loan(loan.meta.id, "fraud".to_string())
            .await
            .unwrap();

        let err = service
            .reject_loan(loan.meta.id, "again".to_string())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LendingError::InvalidState("loan is not in proposed state")
        ));

        let err = service
            .disburse_loan(
                loan.meta.id,
                DisburseLoanRequest {
                    officer_employee_id: employee.meta.id,
                    signed_agreement_url: "https://docs.example.com/signed.pdf".to_string(),
                    disbursement_date: Utc::now(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LendingError::InvalidState("loan is not in invested state")
        ));
    }

    #[tokio::test]
    async fn test_approve_requires_validator() {
        let (service, _, borrower, _) = setup().await;
        let loan = service.create_loan(create_request(borrower.meta.id)).await.unwrap();

        let err = service
            .approve_loan(
                loan.meta.id,
                ApproveLoanRequest {
                    validator_employee_id: Uuid::new_v4(),
                    visit_proof_picture_url: "https://img.example.com/visit.jpg".to_string(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LendingError::NotFound("validator employee not found")
        ));
    }

    #[tokio::test]
    async fn test_list_filters_by_state() {
        let (service, _, borrower, _) = setup().await;
        let first = service.create_loan(create_request(borrower.meta.id)).await.unwrap();
        service.create_loan(create_request(borrower.meta.id)).await.unwrap();
        service
            .reject_loan(first.meta.id, "duplicate".to_string())
            .await
            .unwrap();

        let proposed = service
            .list_loans(
                LoanFilter {
                    state: Some(LoanState::Proposed),
                    borrower_id: None,
                },
                1,
                20,
            )
            .await
            .unwrap();
        assert_eq!(proposed.data.len(), 1);
        assert!(!proposed.has_next);

        let page = service.list_loans(LoanFilter::default(), 1, 1).await.unwrap();
        assert_eq!(page.data.len(), 1);
        assert!(page.has_next);
        assert!(!page.has_prev);
    }
}
