use modwire::Job;
use serde::{Deserialize, Serialize};

pub const SEND_WELCOME_EMAIL: &str = "send-welcome-email";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailPayload {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Delivery is someone else's concern; the job records what would be sent.
pub fn send_welcome_email() -> Job<EmailPayload> {
    Job::new(SEND_WELCOME_EMAIL, |payload: EmailPayload| async move {
        if payload.to.trim().is_empty() {
            anyhow::bail!("welcome email has no recipient");
        }
        tracing::info!(to = %payload.to, subject = %payload.subject, "Sending welcome email");
        tracing::debug!(to = %payload.to, bytes = payload.body.len(), "Welcome email sent");
        Ok(())
    })
}
