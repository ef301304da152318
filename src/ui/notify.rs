//! Fire-and-forget user notifications.
//!
//! The playback core reports errors through a [`Notifier`] and never waits
//! for, or depends on, the result. The toast queue is the visible surface.

use std::sync::Arc;

/// Notification severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
    Warning,
    Info,
}

/// A user-visible message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub description: String,
    pub level: NoticeLevel,
}

impl Notice {
    /// Create an error notice
    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            level: NoticeLevel::Error,
        }
    }

    /// Create an info notice
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            level: NoticeLevel::Info,
        }
    }
}

/// Sink for user-visible notifications.
pub trait Notifier: Send + Sync {
    /// Show a message. Must not block and must not fail.
    fn notify(&self, notice: Notice);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}
