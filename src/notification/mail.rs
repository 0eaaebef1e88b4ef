//! Mail delivery for notifications

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::info;

use super::{MailMessage, Notification, NotificationBus};

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Invalid mail recipient: {0:?}")]
    InvalidRecipient(String),
}

/// Outgoing mail transport
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    async fn send(&self, message: MailMessage) -> Result<(), MailError>;
}

/// Mailer that records each message in the log instead of sending it.
/// Messages without a deliverable address are refused.
pub struct TracingMailer {
    from: String,
}

impl TracingMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl Mailer for TracingMailer {
    async fn send(&self, message: MailMessage) -> Result<(), MailError> {
        if !message.to.contains('@') {
            return Err(MailError::InvalidRecipient(message.to));
        }

        info!(
            from = %self.from,
            to = %message.to,
            subject = %message.subject,
            template = %message.template,
            "Mail dispatched"
        );
        Ok(())
    }
}

/// Subscribe the mail dispatcher: every notification is rendered and
/// handed to `mailer`.
pub fn register_mail_dispatcher<M: Mailer>(
    bus: &NotificationBus<Notification>,
    mailer: Arc<M>,
    app_url: String,
) -> JoinHandle<()> {
    bus.subscribe_async("mail_dispatcher", move |notification: Notification| {
        let mailer = mailer.clone();
        let message = notification.to_mail(&app_url);
        async move { mailer.send(message).await }
    })
}
