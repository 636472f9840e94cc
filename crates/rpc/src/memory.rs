//! In-process backend: the authoritative subscription table kept in a map.

use std::{
    collections::{BTreeSet, HashMap},
    sync::Mutex,
};

use {
    async_trait::async_trait,
    pushsub_common::{Channel, ChannelRange, DeviceToken, PushError, Result},
    pushsub_protocol::{Method, codes},
    tracing::debug,
};

use crate::gateway::RpcGateway;

const DEFAULT_MAX_CHANNEL_LEN: usize = 256;

pub struct MemoryBackend {
    subscriptions: Mutex<HashMap<DeviceToken, BTreeSet<Channel>>>,
    calls: Mutex<HashMap<Method, usize>>,
    max_channel_len: usize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            max_channel_len: DEFAULT_MAX_CHANNEL_LEN,
        }
    }

    /// Channels longer than `max` bytes are rejected with `invalid_channel`.
    pub fn with_max_channel_len(mut self, max: usize) -> Self {
        self.max_channel_len = max;
        self
    }

    /// Number of calls received for `method`, rejected ones included.
    pub fn call_count(&self, method: Method) -> usize {
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls.get(&method).copied().unwrap_or(0)
    }

    pub fn subscribed_channels(&self, token: &DeviceToken) -> Vec<Channel> {
        let subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        subscriptions
            .get(token)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, method: Method) {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        *calls.entry(method).or_insert(0) += 1;
    }

    fn check_token(token: &DeviceToken) -> Result<()> {
        if token.is_empty() {
            return Err(PushError::rejected(codes::INVALID_TOKEN, "device token is empty"));
        }
        Ok(())
    }

    fn check_channel(&self, channel: &Channel) -> Result<()> {
        if channel.as_str().len() > self.max_channel_len {
            return Err(PushError::rejected(
                codes::INVALID_CHANNEL,
                format!("channel exceeds {} bytes", self.max_channel_len),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl RpcGateway for MemoryBackend {
    async fn set_subscription(
        &self,
        token: &DeviceToken,
        channel: &Channel,
        subscribed: bool,
    ) -> Result<()> {
        self.record(Method::SetSubscription);
        Self::check_token(token)?;
        self.check_channel(channel)?;

        let mut subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        let entry = subscriptions.entry(token.clone()).or_default();
        if subscribed {
            entry.insert(channel.clone());
        } else {
            entry.remove(channel);
            if entry.is_empty() {
                subscriptions.remove(token);
            }
        }
        debug!(token = %token.fingerprint(), channel = %channel, subscribed, "memory backend applied subscription");
        Ok(())
    }

    async fn subscription_status(&self, token: &DeviceToken, channel: &Channel) -> Result<bool> {
        self.record(Method::GetSubscription);
        Self::check_token(token)?;
        self.check_channel(channel)?;

        let subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(subscriptions
            .get(token)
            .is_some_and(|set| set.contains(channel)))
    }

    async fn list_subscriptions(
        &self,
        token: &DeviceToken,
        range: ChannelRange,
    ) -> Result<Vec<Channel>> {
        self.record(Method::ListSubscriptions);
        Self::check_token(token)?;

        let subscriptions = self.subscriptions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(subscriptions
            .get(token)
            .map(|set| {
                set.iter()
                    .skip(range.offset as usize)
                    .take(range.count as usize)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
