#![allow(clippy::unwrap_used, clippy::expect_used)]

mod support;

use std::sync::{Arc, Mutex, atomic::Ordering};

use {
    pushsub_common::{ChannelRange, DeviceToken, PushError},
    pushsub_core::{CallOptions, DetachedPlatform, ObserverContext, PushService},
    pushsub_rpc::{MemoryBackend, RpcGateway},
    support::{Harness, ScriptedGateway, channel, counting_observer, direct_registration, until},
};

#[tokio::test]
async fn set_then_get_round_trips_through_the_backend() {
    let backend: Arc<dyn RpcGateway> = Arc::new(MemoryBackend::new());
    let service = PushService::new(Arc::new(backend), Arc::new(DetachedPlatform));
    service.configure("push.example.com", 4040).unwrap();
    service.on_token_registered(DeviceToken::new(vec![1, 2, 3]));

    for desired in [true, false, true] {
        service
            .set_subscription(&channel("news"), desired, CallOptions::default())
            .await
            .unwrap();
        let status = service
            .subscription_status(&channel("news"), CallOptions::default())
            .await
            .unwrap();
        assert_eq!(status, desired);
        assert_eq!(service.cached_subscription(&channel("news")), Some(desired));
    }
}

#[tokio::test]
async fn concurrent_status_queries_share_one_call() {
    let harness = Harness::ready(ScriptedGateway::gated());
    let observed = counting_observer(&harness.service, ObserverContext::new());
    let gateway = Arc::clone(&harness.gateway);
    let news = channel("news");

    let first = harness
        .service
        .subscription_status(&news, CallOptions::default());
    let second = harness
        .service
        .subscription_status(&news, CallOptions::default());
    let release = async {
        until(|| gateway.calls() == 1).await;
        tokio::task::yield_now().await;
        gateway.release(1);
    };

    let (a, b, ()) = tokio::join!(first, second, release);
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(harness.gateway.calls(), 1);
    // Each triggering caller fires the bus once.
    assert_eq!(observed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn identical_writes_share_one_call() {
    let harness = Harness::ready(ScriptedGateway::gated());
    let observed = counting_observer(&harness.service, ObserverContext::new());
    let gateway = Arc::clone(&harness.gateway);
    let news = channel("news");

    let first = harness
        .service
        .set_subscription(&news, true, CallOptions::default());
    let second = harness
        .service
        .set_subscription(&news, true, CallOptions::default());
    let release = async {
        until(|| gateway.calls() == 1).await;
        tokio::task::yield_now().await;
        gateway.release(1);
    };

    let (a, b, ()) = tokio::join!(first, second, release);
    a.unwrap();
    b.unwrap();
    assert_eq!(harness.gateway.calls(), 1);
    assert_eq!(observed.load(Ordering::SeqCst), 2);
    assert_eq!(harness.service.cached_subscription(&news), Some(true));
}

#[tokio::test]
async fn dropped_first_caller_still_resolves_the_shared_write() {
    let harness = Harness::ready(ScriptedGateway::gated());
    let gateway = Arc::clone(&harness.gateway);
    let news = channel("news");

    gateway.release(1);
    harness
        .service
        .set_subscription(&news, true, CallOptions::silent())
        .await
        .unwrap();
    assert_eq!(harness.service.cached_subscription(&news), Some(true));

    gateway.fail_with(PushError::rejected("invalid_channel", "channel retired"));
    let first = {
        let service = harness.service.clone();
        let news = news.clone();
        tokio::spawn(async move {
            service
                .set_subscription(&news, false, CallOptions::silent())
                .await
        })
    };
    until(|| gateway.calls() == 2).await;
    first.abort();
    assert!(first.await.unwrap_err().is_cancelled());

    let second = harness
        .service
        .set_subscription(&news, false, CallOptions::silent());
    let release = async {
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        gateway.release(1);
    };
    let (result, ()) = tokio::join!(second, release);

    assert!(matches!(result, Err(PushError::BackendRejected { .. })));
    assert_eq!(gateway.calls(), 2);
    assert_eq!(harness.service.cached_subscription(&news), None);
}

#[tokio::test]
async fn opposite_writes_are_not_merged() {
    let harness = Harness::ready(ScriptedGateway::gated());
    let gateway = Arc::clone(&harness.gateway);
    let news = channel("news");

    let subscribe = harness
        .service
        .set_subscription(&news, true, CallOptions::silent());
    let unsubscribe = harness
        .service
        .set_subscription(&news, false, CallOptions::silent());
    let release = async {
        until(|| gateway.calls() == 2).await;
        gateway.release(2);
    };

    let (a, b, ()) = tokio::join!(subscribe, unsubscribe, release);
    a.unwrap();
    b.unwrap();
    assert_eq!(harness.gateway.calls(), 2);
}

#[tokio::test]
async fn observers_fire_in_registration_order_only_when_triggering() {
    let harness = Harness::ready(ScriptedGateway::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    for name in ["first", "second", "third"] {
        let order = Arc::clone(&order);
        harness
            .service
            .add_change_observer(ObserverContext::new(), move || order.lock().unwrap().push(name));
    }

    harness
        .service
        .set_subscription(&channel("news"), true, CallOptions::silent())
        .await
        .unwrap();
    assert!(order.lock().unwrap().is_empty());

    harness
        .service
        .set_subscription(&channel("news"), true, CallOptions::default())
        .await
        .unwrap();
    assert_eq!(*order.lock().unwrap(), ["first", "second", "third"]);
}

#[tokio::test]
async fn removed_observers_are_never_invoked_again() {
    let harness = Harness::ready(ScriptedGateway::new());
    let context = ObserverContext::new();
    let removed = counting_observer(&harness.service, context);
    let kept = counting_observer(&harness.service, ObserverContext::new());

    assert_eq!(harness.service.remove_change_observers(context), 1);
    harness
        .service
        .subscription_status(&channel("news"), CallOptions::default())
        .await
        .unwrap();

    assert_eq!(removed.load(Ordering::SeqCst), 0);
    assert_eq!(kept.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn rejected_set_invalidates_cache_and_stays_quiet() {
    let harness = Harness::ready(ScriptedGateway::new());
    harness
        .service
        .set_subscription(&channel("news"), true, CallOptions::silent())
        .await
        .unwrap();
    let observed = counting_observer(&harness.service, ObserverContext::new());

    harness
        .gateway
        .fail_with(PushError::rejected("invalid_channel", "unknown channel"));
    let err = harness
        .service
        .set_subscription(&channel("news"), false, CallOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, PushError::BackendRejected { .. }));
    assert_eq!(harness.service.cached_subscription(&channel("news")), None);
    assert_eq!(observed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn failed_status_query_never_notifies() {
    let harness = Harness::ready(ScriptedGateway::new());
    let observed = counting_observer(&harness.service, ObserverContext::new());
    harness.gateway.fail_with(PushError::transport("connection reset"));

    let err = harness
        .service
        .subscription_status(&channel("news"), CallOptions::default())
        .await
        .unwrap_err();
    assert!(err.is_ambiguous());
    assert_eq!(observed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn ambiguous_set_failure_notifies_only_when_enabled() {
    let mut config = direct_registration();
    config.behavior.notify_on_ambiguous_failure = true;
    let harness = Harness::new(ScriptedGateway::new(), config);
    harness.service.configure("push.example.com", 4040).unwrap();
    harness
        .service
        .on_token_registered(DeviceToken::new(vec![9]));
    let observed = counting_observer(&harness.service, ObserverContext::new());

    harness.gateway.fail_with(PushError::transport("timed out"));
    harness
        .service
        .set_subscription(&channel("news"), true, CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    harness
        .gateway
        .fail_with(PushError::rejected("invalid_channel", "nope"));
    harness
        .service
        .set_subscription(&channel("news"), true, CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(observed.load(Ordering::SeqCst), 1);

    // Default config stays quiet on the same transport failure.
    let quiet = Harness::ready(ScriptedGateway::new());
    let quiet_count = counting_observer(&quiet.service, ObserverContext::new());
    quiet.gateway.fail_with(PushError::transport("timed out"));
    quiet
        .service
        .set_subscription(&channel("news"), true, CallOptions::default())
        .await
        .unwrap_err();
    assert_eq!(quiet_count.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn listing_pages_without_touching_the_cache() {
    let harness = Harness::ready(ScriptedGateway::new());
    for name in ["alpha", "beta", "gamma"] {
        harness
            .service
            .set_subscription(&channel(name), true, CallOptions::silent())
            .await
            .unwrap();
    }
    harness
        .service
        .set_subscription(&channel("beta"), false, CallOptions::silent())
        .await
        .unwrap();

    let page = harness
        .service
        .list_subscriptions(ChannelRange::new(1, 5), CallOptions::silent())
        .await
        .unwrap();
    assert_eq!(page, vec![channel("gamma")]);
    assert_eq!(harness.service.cached_subscription(&channel("beta")), Some(false));
}

#[tokio::test]
async fn calls_carry_the_token_current_at_dispatch() {
    let harness = Harness::ready(ScriptedGateway::new());
    harness
        .service
        .subscription_status(&channel("news"), CallOptions::silent())
        .await
        .unwrap();
    harness
        .service
        .on_token_registered(DeviceToken::new(vec![0xee]));
    harness
        .service
        .subscription_status(&channel("news"), CallOptions::silent())
        .await
        .unwrap();

    let seen = harness.gateway.tokens_seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].as_bytes(), [0xab, 0xcd]);
    assert_eq!(seen[1].as_bytes(), [0xee]);
}
