//! Toast notifications for non-blocking user feedback.
//!
//! Toasts are ephemeral messages that auto-dismiss after a configurable
//! duration. [`SharedToasts`] is the thread-safe handle the playback core
//! reports into; the rendering layer reads [`ToastQueue::visible`].
//!
//! # Example
//! ```ignore
//! let toasts = SharedToasts::new(ToastSettings::default());
//! toasts.notify(Notice::error("Couldn't load audio", "HTTP 404"));
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::notify::{Notice, NoticeLevel, Notifier};

/// Duration before toasts auto-dismiss
pub const TOAST_DURATION: Duration = Duration::from_secs(4);

/// Maximum number of visible toasts at once
pub const MAX_VISIBLE_TOASTS: usize = 5;

/// Queue limits, usually taken from the `[notifications]` config section
#[derive(Debug, Clone, Copy)]
pub struct ToastSettings {
    pub duration: Duration,
    pub max_visible: usize,
}

impl Default for ToastSettings {
    fn default() -> Self {
        Self {
            duration: TOAST_DURATION,
            max_visible: MAX_VISIBLE_TOASTS,
        }
    }
}

impl From<&crate::config::NotificationConfig> for ToastSettings {
    fn from(config: &crate::config::NotificationConfig) -> Self {
        Self {
            duration: Duration::from_secs(config.toast_duration_secs),
            max_visible: config.max_visible.max(1),
        }
    }
}

/// A single toast notification
#[derive(Debug, Clone)]
pub struct Toast {
    /// Unique ID for this toast (for removal)
    id: u64,
    notice: Notice,
    /// When this toast was created
    created_at: Instant,
}

impl Toast {
    /// Create a new toast with auto-generated ID
    fn new(notice: Notice) -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        Self {
            id: COUNTER.fetch_add(1, Ordering::Relaxed),
            notice,
            created_at: Instant::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn level(&self) -> NoticeLevel {
        self.notice.level
    }

    pub fn title(&self) -> &str {
        &self.notice.title
    }

    pub fn description(&self) -> &str {
        &self.notice.description
    }

    /// Check if this toast should be dismissed
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Container for managing multiple toasts
#[derive(Debug, Clone, Default)]
pub struct ToastQueue {
    toasts: Vec<Toast>,
    settings: ToastSettings,
}

impl ToastQueue {
    /// Create empty toast queue
    pub fn new(settings: ToastSettings) -> Self {
        Self {
            toasts: Vec::new(),
            settings,
        }
    }

    /// Add a toast to the queue
    pub fn push(&mut self, notice: Notice) -> u64 {
        let toast = Toast::new(notice);
        let id = toast.id;
        self.toasts.push(toast);
        // Keep only the most recent toasts
        let max = self.settings.max_visible.max(1);
        if self.toasts.len() > max * 2 {
            self.toasts.drain(0..max);
        }
        id
    }

    /// Remove a toast by ID
    pub fn remove(&mut self, id: u64) {
        self.toasts.retain(|t| t.id != id);
    }

    /// Remove all expired toasts
    pub fn remove_expired(&mut self) {
        let ttl = self.settings.duration;
        self.toasts.retain(|t| !t.is_expired(ttl));
    }

    /// Get visible toasts (most recent, up to `max_visible`)
    pub fn visible(&self) -> impl Iterator<Item = &Toast> {
        let ttl = self.settings.duration;
        let start = self.toasts.len().saturating_sub(self.settings.max_visible);
        self.toasts[start..].iter().filter(move |t| !t.is_expired(ttl))
    }

    /// Number of toasts held, including expired ones not yet pruned
    pub fn len(&self) -> usize {
        self.toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.toasts.is_empty()
    }

    /// Count toasts at a given level
    pub fn count_level(&self, level: NoticeLevel) -> usize {
        self.toasts.iter().filter(|t| t.level() == level).count()
    }

    /// Convenience: add an error toast
    pub fn error(&mut self, title: impl Into<String>, description: impl Into<String>) {
        self.push(Notice::error(title, description));
    }

    /// Convenience: add an info toast
    pub fn info(&mut self, title: impl Into<String>, description: impl Into<String>) {
        self.push(Notice::info(title, description));
    }
}

/// Thread-safe toast queue handle usable as a [`Notifier`].
#[derive(Debug, Clone, Default)]
pub struct SharedToasts {
    queue: Arc<Mutex<ToastQueue>>,
}

impl SharedToasts {
    pub fn new(settings: ToastSettings) -> Self {
        Self {
            queue: Arc::new(Mutex::new(ToastQueue::new(settings))),
        }
    }

    /// Run a closure against the underlying queue
    pub fn with<R>(&self, f: impl FnOnce(&mut ToastQueue) -> R) -> R {
        f(&mut self.queue.lock())
    }

    /// Copy of every notice currently held, oldest first
    pub fn notices(&self) -> Vec<Notice> {
        self.queue.lock().toasts.iter().map(|t| t.notice.clone()).collect()
    }

    /// Visible toasts newer than the toast with id `after`, oldest first
    pub fn since(&self, after: Option<u64>) -> Vec<Toast> {
        self.queue
            .lock()
            .visible()
            .filter(|t| after.is_none_or(|id| t.id > id))
            .cloned()
            .collect()
    }

    /// Number of error toasts currently held
    pub fn error_count(&self) -> usize {
        self.queue.lock().count_level(NoticeLevel::Error)
    }
}

impl Notifier for SharedToasts {
    fn notify(&self, notice: Notice) {
        tracing::debug!(title = %notice.title, "toast");
        self.queue.lock().push(notice);
    }
}
