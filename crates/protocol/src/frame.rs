use {
    base64::{Engine as _, engine::general_purpose::STANDARD},
    pushsub_common::DeviceToken,
    serde::{Deserialize, Serialize, de::DeserializeOwned},
    serde_json::Value,
    thiserror::Error,
};

/// Upper bound for a single frame, newline excluded.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Backend error codes carried in [`RpcErrorBody::code`].
pub mod codes {
    pub const INVALID_TOKEN: &str = "invalid_token";
    pub const INVALID_CHANNEL: &str = "invalid_channel";
    pub const INVALID_PARAMS: &str = "invalid_params";
    pub const UNKNOWN_METHOD: &str = "unknown_method";
    pub const INTERNAL: &str = "internal";
}

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame of {0} bytes exceeds the 64 KiB limit")]
    FrameTooLarge(usize),
    #[error("empty frame")]
    EmptyFrame,
    #[error("device token is not valid base64: {0}")]
    InvalidToken(#[from] base64::DecodeError),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub id: u64,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: impl Serialize) -> Result<Self, ProtocolError> {
        Ok(Self {
            id,
            method: method.into(),
            params: serde_json::to_value(params)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RpcErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

impl RpcResponse {
    pub fn ok(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: u64, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(RpcErrorBody {
                code: code.into(),
                message: message.into(),
            }),
        }
    }

    /// An error body wins over a result; a missing result reads as `null`.
    pub fn into_result(self) -> Result<Value, RpcErrorBody> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// Serialize a frame and terminate it with `\n`.
pub fn encode_frame<T: Serialize>(frame: &T) -> Result<Vec<u8>, ProtocolError> {
    let mut bytes = serde_json::to_vec(frame)?;
    if bytes.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(bytes.len()));
    }
    bytes.push(b'\n');
    Ok(bytes)
}

/// Parse one frame; trailing `\r\n` or `\n` is ignored.
pub fn decode_frame<T: DeserializeOwned>(line: &[u8]) -> Result<T, ProtocolError> {
    let trimmed = line
        .strip_suffix(b"\n")
        .map(|rest| rest.strip_suffix(b"\r").unwrap_or(rest))
        .unwrap_or(line);
    if trimmed.is_empty() {
        return Err(ProtocolError::EmptyFrame);
    }
    if trimmed.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(trimmed.len()));
    }
    Ok(serde_json::from_slice(trimmed)?)
}

pub fn encode_token(token: &DeviceToken) -> String {
    STANDARD.encode(token.as_bytes())
}

pub fn decode_token(encoded: &str) -> Result<DeviceToken, ProtocolError> {
    Ok(DeviceToken::new(STANDARD.decode(encoded.trim())?))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn request_frame_is_newline_terminated() {
        let request = RpcRequest::new(7, "subscription.get", json!({"channel": "news"})).unwrap();
        let bytes = encode_frame(&request).unwrap();
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert_eq!(bytes.iter().filter(|b| **b == b'\n').count(), 1);
    }

    #[test]
    fn decode_accepts_crlf() {
        let frame: RpcResponse = decode_frame(b"{\"id\":3,\"result\":true}\r\n").unwrap();
        assert_eq!(frame.id, 3);
        assert_eq!(frame.into_result().unwrap(), json!(true));
    }

    #[test]
    fn decode_rejects_empty_line() {
        assert!(matches!(
            decode_frame::<RpcResponse>(b"\n"),
            Err(ProtocolError::EmptyFrame)
        ));
    }

    #[test]
    fn error_body_wins_over_result() {
        let mut response = RpcResponse::error(1, codes::INVALID_CHANNEL, "channel too long");
        response.result = Some(json!({"ok": true}));
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, "invalid_channel");
    }

    #[test]
    fn ok_response_omits_error_field() {
        let text = String::from_utf8(encode_frame(&RpcResponse::ok(2, json!(null))).unwrap()).unwrap();
        assert!(!text.contains("error"), "unexpected error field in {text}");
    }

    #[test]
    fn oversized_frame_is_refused() {
        let huge = "x".repeat(MAX_FRAME_LEN + 1);
        let request = RpcRequest::new(1, "subscription.set", json!({ "channel": huge })).unwrap();
        assert!(matches!(
            encode_frame(&request),
            Err(ProtocolError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn token_base64_round_trip_and_bad_input() {
        let token = DeviceToken::new(vec![1, 2, 3, 250]);
        let encoded = encode_token(&token);
        assert_eq!(encoded, "AQID+g==");
        assert_eq!(decode_token(&encoded).unwrap(), token);
        assert!(matches!(
            decode_token("not base64!"),
            Err(ProtocolError::InvalidToken(_))
        ));
    }
}
