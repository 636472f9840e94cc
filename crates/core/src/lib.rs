//! Subscription engine for client-side push notifications.
//!
//! [`PushService`] owns the device-token lifecycle, the advisory
//! subscription cache, coalescing of duplicate remote calls, the change
//! bus, push dispatch and the permission coordinator. Transport comes from
//! [`pushsub_rpc`]; the operating system is reached through
//! [`PushPlatform`].

pub mod cache;
pub mod coalesce;
pub mod dispatch;
pub mod observers;
pub mod options;
pub mod permission;
pub mod platform;
pub mod service;
pub mod token;

pub use {
    dispatch::{Delivery, DeliveryOrigin, PushNotification},
    observers::{ObserverContext, SubscriptionsChanged},
    options::CallOptions,
    permission::{PermissionOutcome, PermissionState},
    platform::{DetachedPlatform, PushPlatform},
    service::PushService,
    token::TokenState,
};
