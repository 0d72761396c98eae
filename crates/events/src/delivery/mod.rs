//! External delivery channels for report notifications.
//!
//! Used by the [`NotificationRouter`](crate::NotificationRouter) to push
//! notifications outside the process.

pub mod email;
pub mod webhook;
