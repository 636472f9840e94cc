//! JSON-lines client: one TCP connection per call, bounded by the configured
//! call timeout.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use {
    async_trait::async_trait,
    pushsub_common::{Channel, ChannelRange, DeviceToken, PushError, Result},
    pushsub_config::ConnectionConfig,
    pushsub_protocol::{
        GetSubscriptionParams, ListSubscriptionsParams, ListSubscriptionsResult, MAX_FRAME_LEN,
        Method, RpcRequest, RpcResponse, SetSubscriptionParams, SetSubscriptionResult,
        SubscriptionStatusResult, decode_frame, encode_frame, encode_token,
    },
    serde::{Serialize, de::DeserializeOwned},
    tokio::{
        io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
        net::TcpStream,
    },
    tracing::debug,
};

use crate::gateway::{GatewayConnector, RpcGateway};

pub struct TcpRpcGateway {
    config: ConnectionConfig,
    next_id: AtomicU64,
}

impl TcpRpcGateway {
    pub fn new(config: ConnectionConfig) -> Self {
        Self {
            config,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    async fn call<P, R>(&self, method: Method, params: P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(id, method.as_str(), params).map_err(PushError::transport)?;
        let timeout = self.config.call_timeout();

        let response = match tokio::time::timeout(timeout, self.exchange(&request)).await {
            Ok(response) => response?,
            Err(_) => {
                return Err(PushError::transport(format!(
                    "{method} timed out after {}ms",
                    timeout.as_millis()
                )));
            },
        };

        if response.id != id {
            return Err(PushError::transport(format!(
                "response id {} does not match request id {id}",
                response.id
            )));
        }

        let value = response
            .into_result()
            .map_err(|body| PushError::rejected(body.code, body.message))?;
        serde_json::from_value(value)
            .map_err(|e| PushError::transport(format!("malformed {method} result: {e}")))
    }

    async fn exchange(&self, request: &RpcRequest) -> Result<RpcResponse> {
        let addr = self.config.addr();
        let frame = encode_frame(request).map_err(PushError::transport)?;

        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|e| PushError::transport(format!("connect to {addr}: {e}")))?;
        stream
            .write_all(&frame)
            .await
            .map_err(|e| PushError::transport(format!("write to {addr}: {e}")))?;

        let (read_half, _write_half) = stream.split();
        let mut reader = BufReader::new(read_half).take(MAX_FRAME_LEN as u64 + 2);
        let mut line = Vec::new();
        let read = reader
            .read_until(b'\n', &mut line)
            .await
            .map_err(|e| PushError::transport(format!("read from {addr}: {e}")))?;
        if read == 0 {
            return Err(PushError::transport(format!(
                "{addr} closed the connection before responding"
            )));
        }
        debug!(addr = %addr, method = %request.method, id = request.id, bytes = read, "rpc response received");

        decode_frame(&line).map_err(|e| PushError::transport(format!("malformed response: {e}")))
    }
}

#[async_trait]
impl RpcGateway for TcpRpcGateway {
    async fn set_subscription(
        &self,
        token: &DeviceToken,
        channel: &Channel,
        subscribed: bool,
    ) -> Result<()> {
        let params = SetSubscriptionParams {
            token: encode_token(token),
            channel: channel.clone(),
            subscribed,
        };
        let result: SetSubscriptionResult = self.call(Method::SetSubscription, params).await?;
        if result.ok {
            Ok(())
        } else {
            Err(PushError::rejected(
                "not_applied",
                format!("backend did not apply subscription change for '{channel}'"),
            ))
        }
    }

    async fn subscription_status(&self, token: &DeviceToken, channel: &Channel) -> Result<bool> {
        let params = GetSubscriptionParams {
            token: encode_token(token),
            channel: channel.clone(),
        };
        let result: SubscriptionStatusResult = self.call(Method::GetSubscription, params).await?;
        Ok(result.subscribed)
    }

    async fn list_subscriptions(
        &self,
        token: &DeviceToken,
        range: ChannelRange,
    ) -> Result<Vec<Channel>> {
        let params = ListSubscriptionsParams {
            token: encode_token(token),
            offset: range.offset,
            count: range.count,
        };
        let result: ListSubscriptionsResult = self.call(Method::ListSubscriptions, params).await?;
        Ok(result.channels)
    }
}

/// Builds a [`TcpRpcGateway`] for each configured target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl GatewayConnector for TcpConnector {
    fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn RpcGateway>> {
        config.validate().map_err(PushError::InvalidConfiguration)?;
        Ok(Arc::new(TcpRpcGateway::new(config.clone())))
    }
}
