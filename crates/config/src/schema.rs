use std::{fmt, time::Duration};

use {
    pushsub_common::NotificationKinds,
    serde::{Deserialize, Serialize},
};

const DEFAULT_CALL_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_PENDING_PUSHES: usize = 16;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Backend target. When present the service is configured at construction.
    pub connection: Option<ConnectionConfig>,
    pub registration: RegistrationConfig,
    pub behavior: BehaviorConfig,
}

impl PushConfig {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(connection) = &self.connection {
            connection.validate()?;
        }
        Ok(())
    }
}

/// Where the push-routing backend lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub server: String,
    pub port: u16,
    /// Per-call transport timeout in milliseconds.
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
}

fn default_call_timeout_ms() -> u64 {
    DEFAULT_CALL_TIMEOUT_MS
}

impl ConnectionConfig {
    pub fn new(server: impl Into<String>, port: u16) -> Self {
        Self {
            server: server.into(),
            port,
            call_timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// `host:port`, suitable for `TcpStream::connect`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.trim(), self.port)
    }

    /// Two configs name the same backend when server and port match; the
    /// timeout is a local tuning knob.
    pub fn same_target(&self, other: &Self) -> bool {
        self.server.trim() == other.server.trim() && self.port == other.port
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.server.trim().is_empty() {
            return Err("connection.server must not be empty".into());
        }
        if self.port == 0 {
            return Err("connection.port must be between 1 and 65535".into());
        }
        if self.call_timeout_ms == 0 {
            return Err("connection.call_timeout_ms must be greater than zero".into());
        }
        Ok(())
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr())
    }
}

/// How the client obtains a device token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationConfig {
    /// Ask for display permission before requesting a device token.
    pub permission_before_registration: bool,
    /// Kinds requested when registration triggers a permission prompt.
    pub default_kinds: NotificationKinds,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            permission_before_registration: true,
            default_kinds: NotificationKinds::all(),
        }
    }
}

/// Behaviour switches where client revisions historically disagreed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Fire change observers when a triggering mutation fails with a
    /// transport error, since the backend may have applied it.
    pub notify_on_ambiguous_failure: bool,
    /// Report whether a permission request reached the platform prompt.
    pub report_prompt_issued: bool,
    /// Pushes held while no handler is registered. Zero drops them.
    pub max_pending_pushes: usize,
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            notify_on_ambiguous_failure: false,
            report_prompt_issued: true,
            max_pending_pushes: DEFAULT_MAX_PENDING_PUSHES,
        }
    }
}
