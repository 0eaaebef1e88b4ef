//! Investment booking
//!
//! A booking locks the loan row and then the investor row, recomputes the
//! loan's invested total under those locks, and writes the investment, the
//! balance debit and any funding transition in one transaction. Notifications
//! go out only after the commit.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{FundingAgreement, Investment, InvestmentFilter};
use crate::error::{ErrorKind, LendingError};
use crate::ledger::{Entity, Ledger, LedgerError, Page};
use crate::loan::{self, FundingError, Loan, LoanPatch, LoanState};
use crate::models::{is_storable_amount, Borrower, Investor, InvestorPatch};
use crate::notification::{InvestmentConfirmed, LoanFunded, Notification, NotificationBus};

/// Row lock acquisition order for a booking. Every code path that locks
/// both rows must follow it.
pub const LOCK_ORDER: [&str; 2] = [Loan::TABLE, Investor::TABLE];

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("investment amount must be greater than 0 with at most 2 decimal places")]
    InvalidAmount,

    #[error("loan not found")]
    LoanNotFound,

    #[error("loan is not in approved")]
    LoanNotApproved,

    #[error("investor not found")]
    InvestorNotFound,

    #[error("insufficient balance")]
    InsufficientFunds,

    #[error("total investment would exceed loan principal amount")]
    CapacityExceeded,

    #[error("investment booking timed out")]
    Timeout,

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::LoanNotFound | BookingError::InvestorNotFound => ErrorKind::NotFound,
            BookingError::InvalidAmount
            | BookingError::LoanNotApproved
            | BookingError::InsufficientFunds
            | BookingError::CapacityExceeded => ErrorKind::InvalidState,
            BookingError::Timeout | BookingError::Ledger(_) => ErrorKind::Internal,
        }
    }
}

impl From<FundingError> for BookingError {
    fn from(err: FundingError) -> Self {
        match err {
            FundingError::NotApproved(_) => BookingError::LoanNotApproved,
            FundingError::Overfunded { .. } => BookingError::CapacityExceeded,
        }
    }
}

/// Everything a committed booking produced
struct Booked {
    investment: Investment,
    investor: Investor,
    loan: Loan,
    funded_now: bool,
}

/// Investment service: booking, agreements and listings
pub struct InvestmentService<L: Ledger> {
    ledger: Arc<L>,
    bus: NotificationBus<Notification>,
    booking_timeout: Duration,
}

impl<L: Ledger> InvestmentService<L> {
    pub fn new(
        ledger: Arc<L>,
        bus: NotificationBus<Notification>,
        booking_timeout: Duration,
    ) -> Self {
        Self {
            ledger,
            bus,
            booking_timeout,
        }
    }

    /// Book `amount` from `investor_id` into `loan_id`.
    ///
    /// Either every effect commits (investment row, balance debit, funding
    /// transition) or none does. On expiry of the booking timeout the
    /// transaction is dropped, which rolls it back and releases its locks.
    pub async fn place_investment(
        &self,
        investor_id: Uuid,
        loan_id: Uuid,
        amount: Decimal,
    ) -> Result<Investment, BookingError> {
        if !is_storable_amount(&amount) {
            return Err(BookingError::InvalidAmount);
        }

        let booked = match tokio::time::timeout(
            self.booking_timeout,
            self.book(investor_id, loan_id, amount),
        )
        .await
        {
            Ok(Ok(booked)) => booked,
            Ok(Err(e)) => {
                match e.kind() {
                    ErrorKind::Internal => {
                        error!(%investor_id, %loan_id, error = %e, "Investment booking failed")
                    }
                    _ => warn!(%investor_id, %loan_id, error = %e, "Investment rejected"),
                }
                return Err(e);
            }
            Err(_) => {
                error!(
                    %investor_id,
                    %loan_id,
                    timeout_ms = self.booking_timeout.as_millis() as u64,
                    "Investment booking timed out"
                );
                return Err(BookingError::Timeout);
            }
        };

        info!(
            investment_id = %booked.investment.meta.id,
            %investor_id,
            %loan_id,
            amount = %amount,
            funded = booked.funded_now,
            "Investment booked"
        );

        self.notify(&booked).await;
        Ok(booked.investment)
    }

    async fn book(
        &self,
        investor_id: Uuid,
        loan_id: Uuid,
        amount: Decimal,
    ) -> Result<Booked, BookingError> {
        let mut tx = self.ledger.begin().await?;

        match self.book_in_tx(investor_id, loan_id, amount, &mut tx).await {
            Ok(booked) => {
                self.ledger.commit(tx).await?;
                Ok(booked)
            }
            Err(e) => {
                if let Err(rollback_err) = self.ledger.rollback(tx).await {
                    error!(error = %rollback_err, "Failed to roll back booking");
                }
                Err(e)
            }
        }
    }

    async fn book_in_tx(
        &self,
        investor_id: Uuid,
        loan_id: Uuid,
        amount: Decimal,
        tx: &mut L::Tx,
    ) -> Result<Booked, BookingError> {
        // Lock order: loan, then investor
        let loan = self
            .ledger
            .get_by_id_with_lock::<Loan>(loan_id, tx)
            .await?
            .ok_or(BookingError::LoanNotFound)?;
        if loan.state != LoanState::Approved {
            return Err(BookingError::LoanNotApproved);
        }

        let investor = self
            .ledger
            .get_by_id_with_lock::<Investor>(investor_id, tx)
            .await?
            .ok_or(BookingError::InvestorNotFound)?;
        if investor.balance < amount {
            return Err(BookingError::InsufficientFunds);
        }

        let invested = self.ledger.total_invested_in_tx(loan_id, tx).await?;
        let new_total = invested + amount;
        if new_total > loan.principal_amount {
            return Err(BookingError::CapacityExceeded);
        }

        let investment = self
            .ledger
            .create_in_tx(Investment::new(loan_id, investor_id, amount), tx)
            .await?;

        let investor = self
            .ledger
            .update_fields_in_tx::<Investor>(investor_id, InvestorPatch::debit(amount), tx)
            .await?
            .ok_or(BookingError::InsufficientFunds)?;

        let step = loan::advance(loan.state, loan.principal_amount, new_total)?;
        let loan = if step.funded_now {
            self.ledger
                .update_fields_in_tx::<Loan>(
                    loan_id,
                    LoanPatch::transition(loan.state, step.next_state),
                    tx,
                )
                .await?
                .ok_or(BookingError::LoanNotApproved)?
        } else {
            loan
        };

        Ok(Booked {
            investment,
            investor,
            loan,
            funded_now: step.funded_now,
        })
    }

    async fn notify(&self, booked: &Booked) {
        self.bus
            .publish(Notification::InvestmentConfirmed(InvestmentConfirmed {
                to: booked.investor.email.clone(),
                investor_name: booked.investor.full_name.clone(),
                investment_id: booked.investment.meta.id,
                loan_id: booked.loan.meta.id,
                amount: booked.investment.amount,
                roi: booked.loan.roi,
                agreement_date: booked.investment.meta.created_at,
            }));

        if !booked.funded_now {
            return;
        }

        let loan_id = booked.loan.meta.id;
        match self.ledger.get_by_id::<Borrower>(booked.loan.borrower_id).await {
            Ok(Some(borrower)) => {
                self.bus.publish(Notification::LoanFunded(LoanFunded {
                    to: borrower.email,
                    borrower_name: borrower.full_name,
                    loan_id,
                    principal_amount: booked.loan.principal_amount,
                    rate: booked.loan.rate,
                }));
            }
            Ok(None) => warn!(
                %loan_id,
                borrower_id = %booked.loan.borrower_id,
                "Borrower missing, loan funded notification skipped"
            ),
            Err(e) => warn!(
                %loan_id,
                error = %e,
                "Borrower lookup failed, loan funded notification skipped"
            ),
        }
    }

    /// Agreement details for one investment
    pub async fn get_funding_agreement(
        &self,
        investment_id: Uuid,
    ) -> Result<FundingAgreement, LendingError> {
        let investment = self
            .ledger
            .get_by_id::<Investment>(investment_id)
            .await?
            .ok_or(LendingError::NotFound("investment not found"))?;
        let loan = self
            .ledger
            .get_by_id::<Loan>(investment.loan_id)
            .await?
            .ok_or(LendingError::NotFound("loan not found"))?;
        let investor = self
            .ledger
            .get_by_id::<Investor>(investment.investor_id)
            .await?
            .ok_or(LendingError::NotFound("investor not found"))?;
        let borrower = self
            .ledger
            .get_by_id::<Borrower>(loan.borrower_id)
            .await?
            .ok_or(LendingError::NotFound("borrower not found"))?;

        Ok(FundingAgreement {
            agreement_id: investment.meta.id,
            agreement_date: investment.meta.created_at,
            amount: investment.amount,
            roi: loan.roi,
            loan_id: loan.meta.id,
            investor_name: investor.full_name,
            borrower_name: borrower.full_name,
        })
    }

    pub async fn list_investments_for_loan(
        &self,
        loan_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Page<Investment>, LendingError> {
        let filter = InvestmentFilter {
            loan_id: Some(loan_id),
            investor_id: None,
        };
        Ok(self.ledger.paginate::<Investment>(filter, page, limit).await?)
    }
}
