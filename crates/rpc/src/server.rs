//! Frame server: answers JSON-lines requests by delegating to an
//! [`RpcGateway`]. Backs the `pushsub serve` command and transport tests.

use std::{future::Future, net::SocketAddr, sync::Arc};

use {
    pushsub_common::{ChannelRange, PushError},
    pushsub_protocol::{
        GetSubscriptionParams, ListSubscriptionsParams, ListSubscriptionsResult, MAX_FRAME_LEN,
        Method, ProtocolError, RpcRequest, RpcResponse, SetSubscriptionParams,
        SetSubscriptionResult, SubscriptionStatusResult, codes, decode_frame, decode_token,
        encode_frame,
    },
    serde::{Serialize, de::DeserializeOwned},
    serde_json::Value,
    tokio::{
        io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
        net::{TcpListener, TcpStream},
    },
    tracing::{debug, info, warn},
};

use crate::gateway::RpcGateway;

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, gateway: Arc<dyn RpcGateway>) -> std::io::Result<()> {
    serve_until(listener, gateway, std::future::pending()).await
}

/// Serve until `shutdown` resolves. Connections already accepted keep
/// running on their own tasks.
pub async fn serve_until<F>(
    listener: TcpListener,
    gateway: Arc<dyn RpcGateway>,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    info!(addr = %local, "push backend listening");
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                info!(addr = %local, "push backend shutting down");
                return Ok(());
            },
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let gateway = Arc::clone(&gateway);
                    tokio::spawn(handle_connection(stream, peer, gateway));
                },
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, gateway: Arc<dyn RpcGateway>) {
    debug!(peer = %peer, "connection opened");
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let limit = MAX_FRAME_LEN as u64 + 2;

    loop {
        let mut line = Vec::new();
        let read = match (&mut reader).take(limit).read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(read) => read,
            Err(e) => {
                debug!(peer = %peer, error = %e, "read failed");
                break;
            },
        };

        let oversized = read as u64 >= limit && line.last() != Some(&b'\n');
        let response = if oversized {
            RpcResponse::error(0, codes::INVALID_PARAMS, "frame exceeds size limit")
        } else {
            match decode_frame::<RpcRequest>(&line) {
                Ok(request) => handle_request(gateway.as_ref(), request).await,
                Err(ProtocolError::EmptyFrame) => continue,
                Err(e) => RpcResponse::error(0, codes::INVALID_PARAMS, e.to_string()),
            }
        };

        let frame = match encode_response(&response) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(peer = %peer, error = %e, "failed to encode response");
                break;
            },
        };
        if let Err(e) = write_half.write_all(&frame).await {
            debug!(peer = %peer, error = %e, "write failed");
            break;
        }
        if oversized {
            break;
        }
    }
    debug!(peer = %peer, "connection closed");
}

/// Encode `response`, replacing one that cannot be framed (an oversized
/// page, say) with an `internal` error for the same request id.
fn encode_response(response: &RpcResponse) -> Result<Vec<u8>, ProtocolError> {
    encode_frame(response).or_else(|e| {
        warn!(id = response.id, error = %e, "response not encodable, answering with internal error");
        encode_frame(&RpcResponse::error(
            response.id,
            codes::INTERNAL,
            format!("response could not be encoded: {e}"),
        ))
    })
}

/// Dispatch one decoded request to `gateway`.
pub async fn handle_request(gateway: &dyn RpcGateway, request: RpcRequest) -> RpcResponse {
    let id = request.id;
    let Some(method) = Method::parse(&request.method) else {
        return RpcResponse::error(
            id,
            codes::UNKNOWN_METHOD,
            format!("unknown method '{}'", request.method),
        );
    };

    let outcome = match method {
        Method::SetSubscription => {
            dispatch(request.params, |p: SetSubscriptionParams| async move {
                let token = decode_token(&p.token)?;
                gateway.set_subscription(&token, &p.channel, p.subscribed).await?;
                Ok::<_, Failure>(SetSubscriptionResult { ok: true })
            })
            .await
        },
        Method::GetSubscription => {
            dispatch(request.params, |p: GetSubscriptionParams| async move {
                let token = decode_token(&p.token)?;
                let subscribed = gateway.subscription_status(&token, &p.channel).await?;
                Ok::<_, Failure>(SubscriptionStatusResult { subscribed })
            })
            .await
        },
        Method::ListSubscriptions => {
            dispatch(request.params, |p: ListSubscriptionsParams| async move {
                let token = decode_token(&p.token)?;
                let range = ChannelRange::new(p.offset, p.count);
                let channels = gateway.list_subscriptions(&token, range).await?;
                Ok::<_, Failure>(ListSubscriptionsResult { channels })
            })
            .await
        },
    };

    match outcome {
        Ok(value) => RpcResponse::ok(id, value),
        Err(e) => {
            debug!(id, method = %method, code = %e.code, "request failed");
            RpcResponse::error(id, e.code, e.message)
        },
    }
}

struct Failure {
    code: String,
    message: String,
}

impl From<PushError> for Failure {
    fn from(error: PushError) -> Self {
        match error {
            PushError::BackendRejected { code, message } => Self { code, message },
            other => Self {
                code: codes::INTERNAL.to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<ProtocolError> for Failure {
    fn from(error: ProtocolError) -> Self {
        let code = match error {
            ProtocolError::InvalidToken(_) => codes::INVALID_TOKEN,
            _ => codes::INVALID_PARAMS,
        };
        Self {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

async fn dispatch<P, R, F, Fut>(params: Value, handler: F) -> Result<Value, Failure>
where
    P: DeserializeOwned,
    R: Serialize,
    F: FnOnce(P) -> Fut,
    Fut: Future<Output = Result<R, Failure>>,
{
    let params: P = serde_json::from_value(params).map_err(|e| Failure {
        code: codes::INVALID_PARAMS.to_string(),
        message: e.to_string(),
    })?;
    let result = handler(params).await?;
    serde_json::to_value(result).map_err(|e| Failure {
        code: codes::INTERNAL.to_string(),
        message: e.to_string(),
    })
}
