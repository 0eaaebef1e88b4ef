//! Post-commit notifications
//!
//! Booking publishes [`Notification`]s on a [`NotificationBus`]; the mail
//! dispatcher turns them into [`MailMessage`]s for a [`Mailer`]. Nothing on
//! this path can fail or slow down the booking that published.

mod bus;
mod mail;
mod message;

pub use bus::{NotificationBus, Topic};
pub use mail::{register_mail_dispatcher, MailError, Mailer, TracingMailer};
pub use message::{InvestmentConfirmed, LoanFunded, MailMessage, Notification};
