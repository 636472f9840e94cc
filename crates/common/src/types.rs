use std::{collections::BTreeSet, fmt};

use {
    serde::{Deserialize, Serialize},
    thiserror::Error,
};

/// Platform-issued opaque identifier for push delivery to one installation.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct DeviceToken(Vec<u8>);

impl DeviceToken {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Lowercase hex of the full token, as APNs-style backends print it.
    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    /// Short prefix used in log lines.
    pub fn fingerprint(&self) -> String {
        let hex = self.to_hex();
        hex.chars().take(8).collect()
    }
}

// Tokens identify a device; never print them whole.
impl fmt::Debug for DeviceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceToken({}…, {} bytes)", self.fingerprint(), self.0.len())
    }
}

impl From<Vec<u8>> for DeviceToken {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for DeviceToken {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

/// Channel names must be non-empty; everything else is left to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("channel name must not be empty")]
pub struct ChannelError;

/// Named topic a device can subscribe to. Case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel(String);

impl Channel {
    pub fn new(name: impl Into<String>) -> Result<Self, ChannelError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChannelError);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Channel {
    type Error = ChannelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Channel {
    type Error = ChannelError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

impl AsRef<str> for Channel {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Page of the subscribed-channel listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRange {
    pub offset: u32,
    pub count: u32,
}

impl ChannelRange {
    pub const fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    /// Exclusive end index, saturating.
    pub fn end(&self) -> u32 {
        self.offset.saturating_add(self.count)
    }
}

impl Default for ChannelRange {
    fn default() -> Self {
        Self::new(0, 100)
    }
}

/// Kind of user-visible notification the host may ask permission for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Alert,
    Badge,
    Sound,
}

impl NotificationKind {
    pub const ALL: [Self; 3] = [Self::Alert, Self::Badge, Self::Sound];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Badge => "badge",
            Self::Sound => "sound",
        }
    }
}

impl std::str::FromStr for NotificationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alert" => Ok(Self::Alert),
            "badge" => Ok(Self::Badge),
            "sound" => Ok(Self::Sound),
            other => Err(format!("unknown notification kind '{other}'")),
        }
    }
}

/// Set of notification kinds, ordered for stable output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationKinds(BTreeSet<NotificationKind>);

impl NotificationKinds {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn all() -> Self {
        NotificationKind::ALL.into_iter().collect()
    }

    pub fn contains(&self, kind: NotificationKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_superset(&self, other: &Self) -> bool {
        self.0.is_superset(&other.0)
    }

    pub fn union(&self, other: &Self) -> Self {
        Self(self.0.union(&other.0).copied().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = NotificationKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<NotificationKind> for NotificationKinds {
    fn from_iter<I: IntoIterator<Item = NotificationKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<const N: usize> From<[NotificationKind; N]> for NotificationKinds {
    fn from(kinds: [NotificationKind; N]) -> Self {
        kinds.into_iter().collect()
    }
}
