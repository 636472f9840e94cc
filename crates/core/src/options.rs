/// Per-call switches for subscription operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallOptions {
    /// Fire change observers when the call succeeds.
    pub trigger_handler: bool,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self::triggering()
    }
}

impl CallOptions {
    pub const fn triggering() -> Self {
        Self {
            trigger_handler: true,
        }
    }

    /// Update state without notifying observers.
    pub const fn silent() -> Self {
        Self {
            trigger_handler: false,
        }
    }
}
