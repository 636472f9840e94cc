//! Scripted collaborators for driving `PushService` deterministically.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    pushsub_common::{Channel, ChannelRange, DeviceToken, NotificationKinds, PushError, Result},
    pushsub_config::{ConnectionConfig, PushConfig},
    pushsub_core::{PushPlatform, PushService},
    pushsub_rpc::{GatewayConnector, RpcGateway},
    tokio::sync::{Semaphore, mpsc},
};

pub fn channel(name: &str) -> Channel {
    Channel::new(name).unwrap()
}

/// Gateway that counts calls, can hold them until released and can fail
/// on demand.
#[derive(Default)]
pub struct ScriptedGateway {
    calls: AtomicUsize,
    gate: Option<Semaphore>,
    failure: Mutex<Option<PushError>>,
    state: Mutex<HashMap<Channel, bool>>,
    tokens: Mutex<Vec<DeviceToken>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call blocks until [`release`](Self::release) hands out a permit.
    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::default()
        }
    }

    pub fn fail_with(&self, error: PushError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn release(&self, calls: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(calls);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn tokens_seen(&self) -> Vec<DeviceToken> {
        self.tokens.lock().unwrap().clone()
    }

    async fn enter(&self, token: &DeviceToken) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.clone());
        if let Some(gate) = &self.gate {
            gate.acquire().await.map_err(PushError::transport)?.forget();
        }
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RpcGateway for ScriptedGateway {
    async fn set_subscription(
        &self,
        token: &DeviceToken,
        channel: &Channel,
        subscribed: bool,
    ) -> Result<()> {
        self.enter(token).await?;
        self.state.lock().unwrap().insert(channel.clone(), subscribed);
        Ok(())
    }

    async fn subscription_status(&self, token: &DeviceToken, channel: &Channel) -> Result<bool> {
        self.enter(token).await?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .get(channel)
            .copied()
            .unwrap_or(false))
    }

    async fn list_subscriptions(
        &self,
        token: &DeviceToken,
        range: ChannelRange,
    ) -> Result<Vec<Channel>> {
        self.enter(token).await?;
        let state = self.state.lock().unwrap();
        let mut channels: Vec<Channel> = state
            .iter()
            .filter(|(_, subscribed)| **subscribed)
            .map(|(channel, _)| channel.clone())
            .collect();
        channels.sort();
        Ok(channels
            .into_iter()
            .skip(range.offset as usize)
            .take(range.count as usize)
            .collect())
    }
}

/// Connector that records every target it is asked to build.
pub struct RecordingConnector {
    gateway: Arc<ScriptedGateway>,
    pub targets: Mutex<Vec<ConnectionConfig>>,
}

impl RecordingConnector {
    pub fn new(gateway: Arc<ScriptedGateway>) -> Self {
        Self {
            gateway,
            targets: Mutex::new(Vec::new()),
        }
    }
}

impl GatewayConnector for RecordingConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn RpcGateway>> {
        self.targets.lock().unwrap().push(config.clone());
        Ok(self.gateway.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformEvent {
    Registration,
    Permission(NotificationKinds),
}

/// Platform that reports each request on a channel and answers nothing by
/// itself; the test plays the operating system.
pub struct ChannelPlatform {
    tx: mpsc::UnboundedSender<PlatformEvent>,
}

impl ChannelPlatform {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PlatformEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl PushPlatform for ChannelPlatform {
    fn request_token_registration(&self) {
        let _ = self.tx.send(PlatformEvent::Registration);
    }

    fn request_notification_permission(&self, kinds: &NotificationKinds) {
        let _ = self.tx.send(PlatformEvent::Permission(kinds.clone()));
    }
}

/// Registration without a permission prompt first.
pub fn direct_registration() -> PushConfig {
    let mut config = PushConfig::default();
    config.registration.permission_before_registration = false;
    config
}

pub struct Harness {
    pub service: PushService,
    pub gateway: Arc<ScriptedGateway>,
    pub connector: Arc<RecordingConnector>,
    pub platform: mpsc::UnboundedReceiver<PlatformEvent>,
}

impl Harness {
    pub fn new(gateway: ScriptedGateway, config: PushConfig) -> Self {
        let gateway = Arc::new(gateway);
        let connector = Arc::new(RecordingConnector::new(Arc::clone(&gateway)));
        let (platform, events) = ChannelPlatform::new();
        let service = PushService::with_config(config, connector.clone(), Arc::new(platform))
            .expect("valid config");
        Self {
            service,
            gateway,
            connector,
            platform: events,
        }
    }

    /// Configured, with a token already registered.
    pub fn ready(gateway: ScriptedGateway) -> Self {
        let harness = Self::new(gateway, direct_registration());
        harness.service.configure("push.example.com", 4040).unwrap();
        harness.service.on_token_registered(DeviceToken::new(vec![0xab, 0xcd]));
        harness
    }
}

/// Yield until `condition` holds.
pub async fn until(condition: impl Fn() -> bool) {
    while !condition() {
        tokio::task::yield_now().await;
    }
}

/// Counter observer: returns the shared count.
pub fn counting_observer(service: &PushService, context: pushsub_core::ObserverContext) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let handle = Arc::clone(&count);
    service.add_change_observer(context, move || {
        handle.fetch_add(1, Ordering::SeqCst);
    });
    count
}
