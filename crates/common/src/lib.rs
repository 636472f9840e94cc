//! Shared error taxonomy and domain types for pushsub crates.

pub mod error;
pub mod types;

pub use {
    error::{ErrorKind, PushError, Result},
    types::{Channel, ChannelError, ChannelRange, DeviceToken, NotificationKind, NotificationKinds},
};
