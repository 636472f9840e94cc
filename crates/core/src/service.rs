//! [`PushService`]: the subscription engine and its platform entry points.

use std::sync::{Arc, RwLock};

use {
    pushsub_common::{Channel, ChannelRange, DeviceToken, NotificationKinds, PushError, Result},
    pushsub_config::{ConnectionConfig, PushConfig},
    pushsub_rpc::{GatewayConnector, RpcGateway},
    serde_json::{Map, Value},
    tokio::sync::broadcast,
    tracing::{debug, info, warn},
};

use crate::{
    cache::SubscriptionCache,
    coalesce::Coalescer,
    dispatch::{Delivery, PushDispatcher, PushNotification},
    observers::{ChangeBus, ObserverContext, SubscriptionsChanged},
    options::CallOptions,
    permission::{PermissionCoordinator, PermissionOutcome, PermissionState, PermissionStep},
    platform::PushPlatform,
    token::{Acquisition, TokenState, TokenStore},
};

struct Connection {
    config: ConnectionConfig,
    gateway: Arc<dyn RpcGateway>,
}

struct Inner {
    config: PushConfig,
    connector: Arc<dyn GatewayConnector>,
    platform: Arc<dyn PushPlatform>,
    connection: RwLock<Option<Connection>>,
    tokens: TokenStore,
    cache: SubscriptionCache,
    set_calls: Arc<Coalescer<(Channel, bool), ()>>,
    get_calls: Arc<Coalescer<Channel, bool>>,
    list_calls: Arc<Coalescer<ChannelRange, Vec<Channel>>>,
    bus: ChangeBus,
    dispatcher: PushDispatcher,
    permissions: PermissionCoordinator,
}

/// Client-side push subscription manager.
///
/// Cloning is cheap; every clone drives the same state. Channel operations
/// need a connection target (see [`configure`](Self::configure)) and a
/// device token. When no token is present the first operation asks the
/// platform to register and every concurrent operation waits on that one
/// registration.
#[derive(Clone)]
pub struct PushService {
    inner: Arc<Inner>,
}

impl PushService {
    /// Service with default configuration and no connection target.
    pub fn new(connector: Arc<dyn GatewayConnector>, platform: Arc<dyn PushPlatform>) -> Self {
        Self::build(PushConfig::default(), connector, platform)
    }

    /// Service built from `config`. A `[connection]` section configures the
    /// target immediately.
    pub fn with_config(
        config: PushConfig,
        connector: Arc<dyn GatewayConnector>,
        platform: Arc<dyn PushPlatform>,
    ) -> Result<Self> {
        config.validate().map_err(PushError::InvalidConfiguration)?;
        let connection = config.connection.clone();
        let service = Self::build(config, connector, platform);
        if let Some(connection) = connection {
            service.configure_with(connection)?;
        }
        Ok(service)
    }

    fn build(
        config: PushConfig,
        connector: Arc<dyn GatewayConnector>,
        platform: Arc<dyn PushPlatform>,
    ) -> Self {
        let dispatcher = PushDispatcher::new(config.behavior.max_pending_pushes);
        let permissions = PermissionCoordinator::new(config.behavior.report_prompt_issued);
        Self {
            inner: Arc::new(Inner {
                config,
                connector,
                platform,
                connection: RwLock::new(None),
                tokens: TokenStore::new(),
                cache: SubscriptionCache::new(),
                set_calls: Arc::new(Coalescer::new()),
                get_calls: Arc::new(Coalescer::new()),
                list_calls: Arc::new(Coalescer::new()),
                bus: ChangeBus::new(),
                dispatcher,
                permissions,
            }),
        }
    }

    pub fn config(&self) -> &PushConfig {
        &self.inner.config
    }

    // ── Connection ──────────────────────────────────────────────────────────

    pub fn configure(&self, server: &str, port: u16) -> Result<()> {
        self.configure_with(ConnectionConfig::new(server, port))
    }

    /// Set the backend target. Repeating the current target is a no-op; a
    /// different one fails with [`PushError::AlreadyConfigured`].
    pub fn configure_with(&self, config: ConnectionConfig) -> Result<()> {
        config.validate().map_err(PushError::InvalidConfiguration)?;

        let mut connection = self
            .inner
            .connection
            .write()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(current) = connection.as_ref() {
            if current.config.same_target(&config) {
                debug!(addr = %config, "already configured for this target");
                return Ok(());
            }
            return Err(PushError::AlreadyConfigured {
                current: current.config.to_string(),
            });
        }

        let gateway = self.inner.connector.connect(&config)?;
        info!(addr = %config, timeout_ms = config.call_timeout_ms, "push backend configured");
        *connection = Some(Connection { config, gateway });
        Ok(())
    }

    pub fn connection(&self) -> Option<ConnectionConfig> {
        let connection = self
            .inner
            .connection
            .read()
            .unwrap_or_else(|e| e.into_inner());
        connection.as_ref().map(|c| c.config.clone())
    }

    fn gateway(&self) -> Result<Arc<dyn RpcGateway>> {
        let connection = self
            .inner
            .connection
            .read()
            .unwrap_or_else(|e| e.into_inner());
        connection
            .as_ref()
            .map(|c| Arc::clone(&c.gateway))
            .ok_or(PushError::NotConfigured)
    }

    // ── Subscriptions ───────────────────────────────────────────────────────

    /// Subscribe or unsubscribe the device on `channel`.
    ///
    /// Concurrent calls with the same channel and desired state share one
    /// remote call. On success the cache records `desired`; on failure the
    /// cache entry is dropped. The remote call runs to completion even if
    /// this future is dropped.
    pub async fn set_subscription(
        &self,
        channel: &Channel,
        desired: bool,
        options: CallOptions,
    ) -> Result<()> {
        let gateway = self.gateway()?;
        let service = self.clone();
        let owned = channel.clone();

        let result = self
            .inner
            .set_calls
            .run((channel.clone(), desired), move || async move {
                service.apply_subscription(gateway, owned, desired).await
            })
            .await;

        let inner = &self.inner;
        match &result {
            Ok(()) if options.trigger_handler => {
                inner.bus.notify_all();
            },
            Err(e)
                if options.trigger_handler
                    && e.is_ambiguous()
                    && inner.config.behavior.notify_on_ambiguous_failure =>
            {
                debug!(channel = %channel, "notifying observers after ambiguous failure");
                inner.bus.notify_all();
            },
            _ => {},
        }
        result
    }

    async fn apply_subscription(
        &self,
        gateway: Arc<dyn RpcGateway>,
        channel: Channel,
        desired: bool,
    ) -> Result<()> {
        let outcome = match self.ensure_token().await {
            Ok(token) => gateway.set_subscription(&token, &channel, desired).await,
            Err(e) => Err(e),
        };
        match &outcome {
            Ok(()) => {
                self.inner.cache.set(channel.clone(), desired);
                debug!(channel = %channel, desired, "subscription updated");
            },
            Err(e) => {
                self.inner.cache.invalidate(&channel);
                warn!(channel = %channel, desired, error = %e, "subscription update failed");
            },
        }
        outcome
    }

    /// Ask the backend whether the device is subscribed to `channel`.
    pub async fn subscription_status(&self, channel: &Channel, options: CallOptions) -> Result<bool> {
        let gateway = self.gateway()?;
        let service = self.clone();
        let owned = channel.clone();

        let result = self
            .inner
            .get_calls
            .run(channel.clone(), move || async move {
                let token = service.ensure_token().await?;
                let subscribed = gateway.subscription_status(&token, &owned).await?;
                service.inner.cache.set(owned, subscribed);
                Ok::<_, PushError>(subscribed)
            })
            .await;

        match &result {
            Ok(_) if options.trigger_handler => {
                self.inner.bus.notify_all();
            },
            Ok(_) => {},
            Err(e) => debug!(channel = %channel, error = %e, "subscription status failed"),
        }
        result
    }

    /// One page of the channels the device is subscribed to. The result is
    /// not merged into the per-channel cache. An empty page makes no remote
    /// call and notifies nobody.
    pub async fn list_subscriptions(
        &self,
        range: ChannelRange,
        options: CallOptions,
    ) -> Result<Vec<Channel>> {
        let gateway = self.gateway()?;
        if range.count == 0 {
            return Ok(Vec::new());
        }
        let service = self.clone();

        let result = self
            .inner
            .list_calls
            .run(range, move || async move {
                let token = service.ensure_token().await?;
                gateway.list_subscriptions(&token, range).await
            })
            .await;

        match &result {
            Ok(_) if options.trigger_handler => {
                self.inner.bus.notify_all();
            },
            Ok(_) => {},
            Err(e) => {
                debug!(offset = range.offset, count = range.count, error = %e, "list subscriptions failed");
            },
        }
        result
    }

    /// The last known state of `channel`, without a round trip.
    pub fn cached_subscription(&self, channel: &Channel) -> Option<bool> {
        self.inner.cache.get(channel)
    }

    // ── Token lifecycle ─────────────────────────────────────────────────────

    async fn ensure_token(&self) -> Result<DeviceToken> {
        let rx = match self.inner.tokens.acquire() {
            Acquisition::Ready(token) => return Ok(token),
            Acquisition::Join(rx) => rx,
            Acquisition::Lead(rx) => {
                self.start_registration().await;
                rx
            },
        };
        rx.await
            .unwrap_or_else(|_| Err(PushError::token_unavailable("registration abandoned")))
    }

    /// Runs registration on its own task when a runtime is available so
    /// that a dropped caller cannot strand the pending state.
    async fn start_registration(&self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let service = self.clone();
                handle.spawn(async move { service.register_with_platform().await });
            },
            Err(_) => self.register_with_platform().await,
        }
    }

    async fn register_with_platform(&self) {
        let registration = &self.inner.config.registration;
        if registration.permission_before_registration && !registration.default_kinds.is_empty() {
            let outcome = self.request_permission(&registration.default_kinds).await;
            debug!(granted = outcome.granted.len(), "permission settled before registration");
        }
        info!("requesting device token from platform");
        self.inner.platform.request_token_registration();
    }

    pub fn current_token(&self) -> Option<DeviceToken> {
        self.inner.tokens.current()
    }

    pub fn token_state(&self) -> TokenState {
        self.inner.tokens.state()
    }

    /// The platform's system-level answer when it has one, otherwise whether
    /// a device token is held.
    pub fn is_push_enabled_by_system(&self) -> bool {
        self.inner
            .platform
            .notifications_enabled()
            .unwrap_or_else(|| self.current_token().is_some())
    }

    /// Platform callback: a device token was issued.
    ///
    /// An empty token counts as a failed registration. A token that replaces
    /// a different one clears the cache and notifies observers, since the
    /// backend keys subscriptions by token.
    pub fn on_token_registered(&self, token: DeviceToken) {
        if token.is_empty() {
            self.on_token_registration_failed("platform returned an empty device token");
            return;
        }
        let fingerprint = token.fingerprint();
        let previous = self.inner.tokens.set_registered(token.clone());
        info!(token = %fingerprint, "device token registered");

        if previous.is_some_and(|previous| previous != token) {
            let cleared = self.inner.cache.clear();
            info!(token = %fingerprint, cleared, "device token changed");
            self.inner.bus.notify_all();
        }
    }

    /// Platform callback: registration failed. Every operation waiting for a
    /// token fails with [`PushError::TokenUnavailable`].
    pub fn on_token_registration_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let failed = self.inner.tokens.set_failed(reason.clone());
        warn!(reason = %reason, waiters = failed, "device token registration failed");
    }

    /// Platform callback: the token was withdrawn.
    pub fn on_token_revoked(&self) {
        if let Some(previous) = self.inner.tokens.revoke() {
            let cleared = self.inner.cache.clear();
            info!(token = %previous.fingerprint(), cleared, "device token revoked");
            self.inner.bus.notify_all();
        }
    }

    // ── Permission ──────────────────────────────────────────────────────────

    pub async fn request_permission(&self, kinds: &NotificationKinds) -> PermissionOutcome {
        let rx = match self.inner.permissions.begin(kinds) {
            PermissionStep::Ready(outcome) => return outcome,
            PermissionStep::Join(rx) => rx,
            PermissionStep::Prompt { kinds, outcome } => {
                info!(kinds = kinds.len(), "requesting notification permission");
                self.inner.platform.request_notification_permission(&kinds);
                outcome
            },
        };
        rx.await.unwrap_or_else(|_| PermissionOutcome {
            granted: NotificationKinds::none(),
            was_requested: None,
        })
    }

    /// Platform callback: the permission prompt was answered.
    pub fn on_permission_request_finished(&self, granted: NotificationKinds) {
        self.inner.permissions.finish(granted);
    }

    pub fn permission_state(&self) -> PermissionState {
        self.inner.permissions.state()
    }

    // ── Observers ───────────────────────────────────────────────────────────

    pub fn add_change_observer<F>(&self, context: ObserverContext, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.bus.add(context, callback);
    }

    /// Replace the callbacks registered under `context` with `callback`
    /// atomically with respect to notifications.
    pub fn replace_change_observer<F>(&self, context: ObserverContext, callback: F) -> usize
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.inner.bus.replace(context, callback)
    }

    pub fn remove_change_observers(&self, context: ObserverContext) -> usize {
        self.inner.bus.remove_all(context)
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<SubscriptionsChanged> {
        self.inner.bus.subscribe()
    }

    // ── Push delivery ───────────────────────────────────────────────────────

    /// Install the push handler, replacing any previous one. Pushes queued
    /// while no handler was set are delivered to it immediately.
    pub fn set_push_handler<F>(&self, handler: F) -> usize
    where
        F: Fn(&PushNotification) + Send + Sync + 'static,
    {
        self.inner.dispatcher.set_handler(handler)
    }

    pub fn clear_push_handler(&self) -> bool {
        self.inner.dispatcher.clear_handler()
    }

    /// Platform callback: a push arrived while the process was running.
    pub fn handle_push(&self, payload: Map<String, Value>, app_active: bool) -> Delivery {
        self.inner
            .dispatcher
            .dispatch(PushNotification::live(payload, app_active))
    }

    /// Platform callback: the process was launched by a push.
    pub fn handle_launch_push(&self, payload: Map<String, Value>) -> Delivery {
        self.inner
            .dispatcher
            .dispatch(PushNotification::launch(payload))
    }
}
