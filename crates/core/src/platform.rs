//! Boundary to the operating system's remote-notification facilities.

use {pushsub_common::NotificationKinds, tracing::debug};

/// Requests the core issues to the host platform.
///
/// Both requests are fire-and-forget: outcomes come back through
/// [`PushService::on_token_registered`],
/// [`PushService::on_token_registration_failed`] and
/// [`PushService::on_permission_request_finished`]. Implementations must not
/// call back into the service synchronously while holding their own locks.
///
/// [`PushService::on_token_registered`]: crate::PushService::on_token_registered
/// [`PushService::on_token_registration_failed`]: crate::PushService::on_token_registration_failed
/// [`PushService::on_permission_request_finished`]: crate::PushService::on_permission_request_finished
pub trait PushPlatform: Send + Sync {
    fn request_token_registration(&self);

    fn request_notification_permission(&self, kinds: &NotificationKinds);

    /// The system-level push switch, when the platform can report it.
    fn notifications_enabled(&self) -> Option<bool> {
        None
    }
}

/// Platform for processes with no OS push integration (CLI, servers).
/// Tokens are supplied directly through `on_token_registered`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetachedPlatform;

impl PushPlatform for DetachedPlatform {
    fn request_token_registration(&self) {
        debug!("token registration requested without a platform; supply a token directly");
    }

    fn request_notification_permission(&self, kinds: &NotificationKinds) {
        debug!(kinds = kinds.len(), "permission requested without a platform");
    }
}
