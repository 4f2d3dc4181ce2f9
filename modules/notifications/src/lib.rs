//! Notifications: the `send-welcome-email` job and an endpoint that enqueues it.
mod controller;
mod jobs;
mod module;

pub use controller::NotificationsController;
pub use jobs::{send_welcome_email, EmailPayload, SEND_WELCOME_EMAIL};
pub use module::{declare, NOTIFICATIONS_CONTROLLER, NOTIFICATIONS_MODULE};
