use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("No recipients for message \"{0}\"")]
    NoRecipients(String),
    #[error("Missing mail template: {0}")]
    MissingTemplate(String),
    #[error("Mail delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn deliver(&self, email: OutgoingEmail) -> Result<(), MailError>;
}

/// Mailer that only logs. Used for local runs without an outbox.
pub struct TracingMailer;

#[async_trait]
impl Mailer for TracingMailer {
    async fn deliver(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if email.to.is_empty() && email.bcc.is_empty() {
            return Err(MailError::NoRecipients(email.subject));
        }
        info!("Mail to {:?} (bcc {:?}): {}", email.to, email.bcc, email.subject);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tracing_mailer_requires_recipients() {
        let mail = OutgoingEmail {
            from: "store@example.com".to_string(),
            to: vec![],
            bcc: vec![],
            subject: "Hello".to_string(),
            body: String::new(),
        };
        assert!(TracingMailer.deliver(mail.clone()).await.is_err());

        let mail = OutgoingEmail { to: vec!["santa@example.com".to_string()], ..mail };
        assert!(TracingMailer.deliver(mail).await.is_ok());
    }
}
