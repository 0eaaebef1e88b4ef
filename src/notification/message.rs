//! Notification catalog and its rendering into outgoing mail

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::Topic;

/// Sent to the investor once a booking has committed
#[derive(Debug, Clone, Serialize)]
pub struct InvestmentConfirmed {
    pub to: String,
    pub investor_name: String,
    pub investment_id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub roi: Decimal,
    pub agreement_date: DateTime<Utc>,
}

/// Sent to the borrower when a booking completes the loan's funding
#[derive(Debug, Clone, Serialize)]
pub struct LoanFunded {
    pub to: String,
    pub borrower_name: String,
    pub loan_id: Uuid,
    pub principal_amount: Decimal,
    pub rate: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    InvestmentConfirmed(InvestmentConfirmed),
    LoanFunded(LoanFunded),
}

impl Topic for Notification {
    const NAME: &'static str = "mail.send";
}

/// A rendered mail ready for a [`Mailer`](super::Mailer)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MailMessage {
    pub to: String,
    pub subject: String,
    pub template: String,
    pub data: Value,
}

impl Notification {
    pub fn recipient(&self) -> &str {
        match self {
            Notification::InvestmentConfirmed(n) => &n.to,
            Notification::LoanFunded(n) => &n.to,
        }
    }

    pub fn to_mail(&self, app_url: &str) -> MailMessage {
        let year = Utc::now().year();

        match self {
            Notification::InvestmentConfirmed(n) => MailMessage {
                to: n.to.clone(),
                subject: "Your Investment is Confirmed".to_string(),
                template: "investment_confirmed.html".to_string(),
                data: json!({
                    "investment_id": n.investment_id,
                    "loan_id": n.loan_id,
                    "investor_name": n.investor_name,
                    "investment_amount": n.amount,
                    "roi": n.roi,
                    "agreement_date": n.agreement_date,
                    "app_url": app_url,
                    "year": year,
                }),
            },
            Notification::LoanFunded(n) => MailMessage {
                to: n.to.clone(),
                subject: "Your Loan Has Been Funded".to_string(),
                template: "loan_invested.html".to_string(),
                data: json!({
                    "loan_id": n.loan_id,
                    "borrower_name": n.borrower_name,
                    "principal_amount": n.principal_amount,
                    "interest_rate": n.rate,
                    "app_url": app_url,
                    "year": year,
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_loan_funded_mail() {
        let loan_id = Uuid::new_v4();
        let notification = Notification::LoanFunded(LoanFunded {
            to: "budi@example.com".to_string(),
            borrower_name: "Budi".to_string(),
            loan_id,
            principal_amount: dec!(1000),
            rate: dec!(0.12),
        });

        let mail = notification.to_mail("https://lend.example.com");
        assert_eq!(notification.recipient(), "budi@example.com");
        assert_eq!(mail.subject, "Your Loan Has Been Funded");
        assert_eq!(mail.template, "loan_invested.html");
        assert_eq!(mail.data["loan_id"], json!(loan_id));
        assert_eq!(mail.data["borrower_name"], "Budi");
        assert_eq!(mail.data["app_url"], "https://lend.example.com");
        assert_eq!(mail.data["year"], json!(Utc::now().year()));
    }

    #[test]
    fn test_investment_confirmed_mail() {
        let notification = Notification::InvestmentConfirmed(InvestmentConfirmed {
            to: "ada@example.com".to_string(),
            investor_name: "Ada".to_string(),
            investment_id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            amount: dec!(250),
            roi: dec!(0.10),
            agreement_date: Utc::now(),
        });

        let mail = notification.to_mail("http://localhost:3001");
        assert_eq!(mail.to, "ada@example.com");
        assert_eq!(mail.subject, "Your Investment is Confirmed");
        assert_eq!(mail.template, "investment_confirmed.html");
        assert_eq!(mail.data["investor_name"], "Ada");
    }
}
