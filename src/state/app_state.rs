//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::investment::InvestmentService;
use crate::ledger::Ledger;
use crate::loan::LoanService;

/// Shared application state, generic over the ledger backend
pub struct AppState<L: Ledger> {
    pub ledger: Arc<L>,
    pub loan_service: Arc<LoanService<L>>,
    pub investment_service: Arc<InvestmentService<L>>,
}

impl<L: Ledger> AppState<L> {
    pub fn new(
        ledger: Arc<L>,
        loan_service: Arc<LoanService<L>>,
        investment_service: Arc<InvestmentService<L>>,
    ) -> Self {
        Self {
            ledger,
            loan_service,
            investment_service,
        }
    }
}

impl<L: Ledger> Clone for AppState<L> {
    fn clone(&self) -> Self {
        Self {
            ledger: self.ledger.clone(),
            loan_service: self.loan_service.clone(),
            investment_service: self.investment_service.clone(),
        }
    }
}

impl<L: Ledger> FromRef<AppState<L>> for Arc<LoanService<L>> {
    fn from_ref(app_state: &AppState<L>) -> Self {
        app_state.loan_service.clone()
    }
}

impl<L: Ledger> FromRef<AppState<L>> for Arc<InvestmentService<L>> {
    fn from_ref(app_state: &AppState<L>) -> Self {
        app_state.investment_service.clone()
    }
}
