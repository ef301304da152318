//! User-facing surfaces that sit on top of the player.
//!
//! - [`notify`]: the notification seam the player reports errors through
//! - [`toast`]: bounded, expiring toast queue implementing it
//! - [`now_playing`]: view state folded from playback events
//! - [`meter`]: decorative level meter for the now-playing strip

pub mod meter;
pub mod notify;
pub mod now_playing;
pub mod toast;

pub use notify::{Notice, NoticeLevel, Notifier};
pub use now_playing::NowPlayingView;
pub use toast::{SharedToasts, ToastQueue, ToastSettings};
