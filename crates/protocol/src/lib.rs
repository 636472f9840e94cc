//! Wire protocol spoken between the subscription client and the push-routing
//! backend: newline-delimited JSON request/response frames.

pub mod frame;
pub mod methods;

pub use {
    frame::{
        MAX_FRAME_LEN, ProtocolError, RpcErrorBody, RpcRequest, RpcResponse, codes, decode_frame,
        decode_token, encode_frame, encode_token,
    },
    methods::{
        GetSubscriptionParams, ListSubscriptionsParams, ListSubscriptionsResult, Method,
        SetSubscriptionParams, SetSubscriptionResult, SubscriptionStatusResult,
    },
};
