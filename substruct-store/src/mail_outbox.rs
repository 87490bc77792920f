use async_trait::async_trait;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use substruct_core::mailer::{MailError, Mailer, OutgoingEmail};

/// Queues outgoing mail in `mail_outbox`; an SMTP relay picks up rows with no `sent_at`.
pub struct PostgresMailOutbox {
    pool: PgPool,
}

impl PostgresMailOutbox {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Mailer for PostgresMailOutbox {
    async fn deliver(&self, email: OutgoingEmail) -> Result<(), MailError> {
        if email.to.is_empty() && email.bcc.is_empty() {
            return Err(MailError::NoRecipients(email.subject));
        }

        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO mail_outbox (id, from_address, to_addresses, bcc_addresses, subject, body)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(id)
        .bind(&email.from)
        .bind(&email.to)
        .bind(&email.bcc)
        .bind(&email.subject)
        .bind(&email.body)
        .execute(&self.pool)
        .await
        .map_err(|e| MailError::Delivery(e.to_string()))?;

        info!("Queued mail {} \"{}\"", id, email.subject);
        Ok(())
    }
}
