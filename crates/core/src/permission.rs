//! Notification-display permission, with concurrent requests sharing one
//! platform prompt.

use std::sync::Mutex;

use {
    pushsub_common::NotificationKinds,
    serde::Serialize,
    tokio::sync::oneshot,
    tracing::debug,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "kinds", rename_all = "snake_case")]
pub enum PermissionState {
    Unknown,
    /// A platform prompt is showing for these kinds.
    Requested(NotificationKinds),
    Granted(NotificationKinds),
    Denied,
}

impl PermissionState {
    pub fn granted_kinds(&self) -> NotificationKinds {
        match self {
            Self::Granted(kinds) => kinds.clone(),
            _ => NotificationKinds::none(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionOutcome {
    pub granted: NotificationKinds,
    /// Whether a platform prompt was involved. `None` when reporting is
    /// disabled in `behavior.report_prompt_issued`.
    pub was_requested: Option<bool>,
}

/// What the caller of [`PermissionCoordinator::begin`] must do next.
#[derive(Debug)]
pub enum PermissionStep {
    Ready(PermissionOutcome),
    /// Wait for the prompt already in flight.
    Join(oneshot::Receiver<PermissionOutcome>),
    /// Show the platform prompt for these kinds, then wait.
    Prompt {
        kinds: NotificationKinds,
        outcome: oneshot::Receiver<PermissionOutcome>,
    },
}

struct PermissionInner {
    state: PermissionState,
    /// Last granted set, kept while a prompt is showing.
    granted: NotificationKinds,
    waiters: Vec<oneshot::Sender<PermissionOutcome>>,
}

pub struct PermissionCoordinator {
    inner: Mutex<PermissionInner>,
    report_prompt_issued: bool,
}

impl PermissionCoordinator {
    pub fn new(report_prompt_issued: bool) -> Self {
        Self {
            inner: Mutex::new(PermissionInner {
                state: PermissionState::Unknown,
                granted: NotificationKinds::none(),
                waiters: Vec::new(),
            }),
            report_prompt_issued,
        }
    }

    pub fn state(&self) -> PermissionState {
        self.lock().state.clone()
    }

    pub fn begin(&self, kinds: &NotificationKinds) -> PermissionStep {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match &inner.state {
            PermissionState::Granted(granted) if granted.is_superset(kinds) => {
                return PermissionStep::Ready(self.outcome(granted.clone(), false));
            },
            PermissionState::Requested(_) => {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push(tx);
                return PermissionStep::Join(rx);
            },
            _ => {},
        }

        let prompt = inner.granted.union(kinds);
        let (tx, rx) = oneshot::channel();
        inner.waiters.push(tx);
        inner.state = PermissionState::Requested(prompt.clone());
        PermissionStep::Prompt {
            kinds: prompt,
            outcome: rx,
        }
    }

    /// Record the platform's answer and resolve every waiting request with
    /// it. Returns how many requests were resolved.
    pub fn finish(&self, granted: NotificationKinds) -> usize {
        let waiters = {
            let mut inner = self.lock();
            inner.state = if granted.is_empty() {
                PermissionState::Denied
            } else {
                PermissionState::Granted(granted.clone())
            };
            inner.granted = granted.clone();
            std::mem::take(&mut inner.waiters)
        };
        let resolved = waiters.len();
        let outcome = self.outcome(granted, true);
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        debug!(resolved, granted = outcome.granted.len(), "permission request finished");
        resolved
    }

    fn outcome(&self, granted: NotificationKinds, prompted: bool) -> PermissionOutcome {
        PermissionOutcome {
            granted,
            was_requested: self.report_prompt_issued.then_some(prompted),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PermissionInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, pushsub_common::NotificationKind};

    fn kinds<const N: usize>(k: [NotificationKind; N]) -> NotificationKinds {
        NotificationKinds::from(k)
    }

    #[tokio::test]
    async fn second_request_joins_the_prompt() {
        let coordinator = PermissionCoordinator::new(true);
        let PermissionStep::Prompt { kinds: prompted, outcome } =
            coordinator.begin(&kinds([NotificationKind::Alert]))
        else {
            panic!("expected prompt");
        };
        assert_eq!(prompted, kinds([NotificationKind::Alert]));
        let PermissionStep::Join(joined) = coordinator.begin(&kinds([NotificationKind::Badge])) else {
            panic!("expected join");
        };

        assert_eq!(coordinator.finish(kinds([NotificationKind::Alert])), 2);
        let first = outcome.await.unwrap();
        let second = joined.await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.was_requested, Some(true));
    }

    #[test]
    fn granted_superset_resolves_immediately() {
        let coordinator = PermissionCoordinator::new(true);
        coordinator.finish(NotificationKinds::all());
        let PermissionStep::Ready(outcome) = coordinator.begin(&kinds([NotificationKind::Sound])) else {
            panic!("expected ready");
        };
        assert_eq!(outcome.granted, NotificationKinds::all());
        assert_eq!(outcome.was_requested, Some(false));
    }

    #[test]
    fn missing_kind_prompts_for_the_union() {
        let coordinator = PermissionCoordinator::new(true);
        coordinator.finish(kinds([NotificationKind::Alert]));
        let PermissionStep::Prompt { kinds: prompted, .. } =
            coordinator.begin(&kinds([NotificationKind::Badge]))
        else {
            panic!("expected prompt");
        };
        assert_eq!(prompted, kinds([NotificationKind::Alert, NotificationKind::Badge]));
    }

    #[test]
    fn empty_grant_is_denied() {
        let coordinator = PermissionCoordinator::new(false);
        coordinator.finish(NotificationKinds::none());
        assert_eq!(coordinator.state(), PermissionState::Denied);
        let PermissionStep::Prompt { .. } = coordinator.begin(&kinds([NotificationKind::Alert])) else {
            panic!("denied permission should prompt again");
        };
    }

    #[tokio::test]
    async fn reporting_disabled_yields_none() {
        let coordinator = PermissionCoordinator::new(false);
        let PermissionStep::Prompt { outcome, .. } = coordinator.begin(&NotificationKinds::all()) else {
            panic!("expected prompt");
        };
        coordinator.finish(NotificationKinds::all());
        assert_eq!(outcome.await.unwrap().was_requested, None);
    }
}
