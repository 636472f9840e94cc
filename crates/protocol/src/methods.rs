//! Typed params and results for the three subscription methods.

use {
    pushsub_common::Channel,
    serde::{Deserialize, Serialize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    SetSubscription,
    GetSubscription,
    ListSubscriptions,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SetSubscription => "subscription.set",
            Self::GetSubscription => "subscription.get",
            Self::ListSubscriptions => "subscription.list",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "subscription.set" => Some(Self::SetSubscription),
            "subscription.get" => Some(Self::GetSubscription),
            "subscription.list" => Some(Self::ListSubscriptions),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Params for `subscription.set`. `token` is base64.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetSubscriptionParams {
    pub token: String,
    pub channel: Channel,
    pub subscribed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SetSubscriptionResult {
    pub ok: bool,
}

/// Params for `subscription.get`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GetSubscriptionParams {
    pub token: String,
    pub channel: Channel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatusResult {
    pub subscribed: bool,
}

/// Params for `subscription.list`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ListSubscriptionsParams {
    pub token: String,
    #[serde(default)]
    pub offset: u32,
    pub count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListSubscriptionsResult {
    #[serde(default)]
    pub channels: Vec<Channel>,
}
