use std::sync::Arc;

use async_trait::async_trait;
use modwire::axum::http::StatusCode;
use modwire::{json, Args, Controller, HandlerResult, HttpError, Job, JobQueue};

use crate::jobs::{send_welcome_email, EmailPayload};

/// `POST /notifications/welcome` → enqueue `send-welcome-email`, answer 202 with the job handle.
pub struct NotificationsController {
    queue: Arc<JobQueue>,
    welcome: Job<EmailPayload>,
}

impl NotificationsController {
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self {
            queue,
            welcome: send_welcome_email(),
        }
    }
}

#[async_trait]
impl Controller for NotificationsController {
    async fn invoke(&self, handler: &str, args: Args) -> HandlerResult {
        match handler {
            "welcome" => {
                let payload: EmailPayload = args.require(0)?;
                let ctx = args
                    .context(1)
                    .ok_or_else(|| HttpError::internal_error("request context not bound"))?;
                let handle = self
                    .welcome
                    .enqueue(&self.queue, payload)
                    .await
                    .map_err(|e| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, format!("{e:#}")))?;
                ctx.set_status(StatusCode::ACCEPTED);
                json(handle)
            }
            other => Err(HttpError::unknown_handler(other)),
        }
    }
}
