use std::sync::Arc;

use {
    async_trait::async_trait,
    pushsub_common::{Channel, ChannelRange, DeviceToken, Result},
    pushsub_config::ConnectionConfig,
};

/// The three remote subscription operations.
///
/// Implementations own transport and serialization. Every call resolves
/// exactly once; timeouts surface as [`PushError::Transport`] and
/// application-level denials as [`PushError::BackendRejected`].
///
/// [`PushError::Transport`]: pushsub_common::PushError::Transport
/// [`PushError::BackendRejected`]: pushsub_common::PushError::BackendRejected
#[async_trait]
pub trait RpcGateway: Send + Sync {
    async fn set_subscription(
        &self,
        token: &DeviceToken,
        channel: &Channel,
        subscribed: bool,
    ) -> Result<()>;

    async fn subscription_status(&self, token: &DeviceToken, channel: &Channel) -> Result<bool>;

    async fn list_subscriptions(
        &self,
        token: &DeviceToken,
        range: ChannelRange,
    ) -> Result<Vec<Channel>>;
}

/// Builds a gateway once the connection target is known.
pub trait GatewayConnector: Send + Sync {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn RpcGateway>>;
}

/// Reuse one prebuilt gateway regardless of target. Handy for tests and for
/// hosts that bring their own transport.
impl GatewayConnector for Arc<dyn RpcGateway> {
    fn connect(&self, _config: &ConnectionConfig) -> Result<Arc<dyn RpcGateway>> {
        Ok(Arc::clone(self))
    }
}
