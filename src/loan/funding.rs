//! Funding state machine
//!
//! Decides what a loan's state becomes once a booking has raised its
//! invested total. Pure: callers supply the state and amounts read under
//! the loan's row lock and persist the outcome in the same transaction.

use rust_decimal::Decimal;
use thiserror::Error;

use super::LoanState;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FundingError {
    #[error("loan is not in approved state (current state: {0})")]
    NotApproved(LoanState),

    #[error("invested total {total} exceeds principal {principal}")]
    Overfunded { total: Decimal, principal: Decimal },
}

/// Outcome of a funding step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Advance {
    pub next_state: LoanState,
    /// True exactly once per loan: on the booking that completes funding
    pub funded_now: bool,
}

/// Advance `current` given the invested total after the new booking
pub fn advance(
    current: LoanState,
    principal: Decimal,
    new_total: Decimal,
) -> Result<Advance, FundingError> {
    if current != LoanState::Approved {
        return Err(FundingError::NotApproved(current));
    }

    if new_total > principal {
        return Err(FundingError::Overfunded {
            total: new_total,
            principal,
        });
    }

    if new_total == principal {
        Ok(Advance {
            next_state: LoanState::Invested,
            funded_now: true,
        })
    } else {
        Ok(Advance {
            next_state: current,
            funded_now: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_partial_funding_keeps_state() {
        let step = advance(LoanState::Approved, dec!(1000), dec!(400)).unwrap();
        assert_eq!(step.next_state, LoanState::Approved);
        assert!(!step.funded_now);
    }

    #[test]
    fn test_exact_funding_moves_to_invested() {
        let step = advance(LoanState::Approved, dec!(1000), dec!(1000.00)).unwrap();
        assert_eq!(step.next_state, LoanState::Invested);
        assert!(step.funded_now);
    }

    #[test]
    fn test_overfunding_is_rejected() {
        let err = advance(LoanState::Approved, dec!(1000), dec!(1000.01)).unwrap_err();
        assert_eq!(
            err,
            FundingError::Overfunded {
                total: dec!(1000.01),
                principal: dec!(1000),
            }
        );
    }

    #[test]
    fn test_only_approved_loans_advance() {
        for state in [
            LoanState::Proposed,
            LoanState::Rejected,
            LoanState::Invested,
            LoanState::Disbursed,
        ] {
            assert_eq!(
                advance(state, dec!(1000), dec!(10)),
                Err(FundingError::NotApproved(state))
            );
        }
    }
}
