//! C ABI bridge for embedding the pushsub client into native iOS/macOS apps.
//!
//! The host forwards its `UIApplicationDelegate` push hooks here and
//! registers callbacks for the requests Rust makes of the platform (token
//! registration, permission prompts). Subscription calls are asynchronous:
//! they return immediately and resolve through a completion callback.

#![allow(unsafe_code)]

use std::{
    collections::HashMap,
    ffi::{CStr, CString, c_char, c_void},
    panic::{AssertUnwindSafe, catch_unwind},
    sync::{Arc, LazyLock, OnceLock},
};

use {
    pushsub_common::{Channel, ChannelRange, DeviceToken, NotificationKinds, PushError},
    pushsub_config::ConnectionConfig,
    pushsub_core::{
        CallOptions, Delivery, ObserverContext, PushNotification, PushPlatform, PushService,
    },
    pushsub_rpc::TcpConnector,
    serde::{Deserialize, Serialize},
    serde_json::{Map, Value},
};

/// Key under which iOS stores the push that launched the app.
const LAUNCH_NOTIFICATION_KEY: &str = "UIApplicationLaunchOptionsRemoteNotificationKey";

// ── Global bridge state ────────────────────────────────────────────────────

struct BridgeState {
    runtime: tokio::runtime::Runtime,
    service: PushService,
}

impl BridgeState {
    fn new() -> Self {
        emit_log(
            "INFO",
            "bridge",
            "Initializing Rust bridge (tokio runtime + push service)",
        );
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap_or_else(|e| panic!("failed to create tokio runtime: {e}"));

        let config = pushsub_config::discover_and_load();
        let connector = Arc::new(TcpConnector);
        let platform = Arc::new(HostPlatform);
        let service = match PushService::with_config(config, connector.clone(), platform.clone()) {
            Ok(service) => service,
            Err(e) => {
                emit_log(
                    "WARN",
                    "bridge",
                    &format!("push config rejected, starting unconfigured: {e}"),
                );
                PushService::new(connector, platform)
            },
        };

        emit_log("INFO", "bridge", "Bridge initialized successfully");
        Self { runtime, service }
    }
}

static BRIDGE: LazyLock<BridgeState> = LazyLock::new(BridgeState::new);

/// Observer context owning the host's change callback.
static CHANGE_CONTEXT: LazyLock<ObserverContext> = LazyLock::new(ObserverContext::new);

// ── Log callback for Swift ───────────────────────────────────────────────

/// Callback type for forwarding log events to Swift. Rust owns the
/// `log_json` pointer; the callback must copy the data before returning.
type LogCallback = unsafe extern "C" fn(log_json: *const c_char);

static LOG_CALLBACK: OnceLock<LogCallback> = OnceLock::new();

#[derive(Debug, Serialize)]
struct BridgeLogEvent<'a> {
    level: &'a str,
    target: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a HashMap<&'a str, String>>,
}

fn emit_log(level: &str, target: &str, message: &str) {
    emit_log_with_fields(level, target, message, None);
}

fn emit_log_with_fields(
    level: &str,
    target: &str,
    message: &str,
    fields: Option<&HashMap<&str, String>>,
) {
    if let Some(callback) = LOG_CALLBACK.get() {
        let event = BridgeLogEvent {
            level,
            target,
            message,
            fields,
        };
        if let Ok(json) = serde_json::to_string(&event) {
            send_c_string(json, |ptr| {
                // SAFETY: ptr is valid NUL-terminated for the duration of the
                // call and the callback copies before returning.
                unsafe { callback(ptr) }
            });
        }
    }
}

fn send_c_string(payload: String, deliver: impl FnOnce(*const c_char)) {
    if let Ok(c_str) = CString::new(payload) {
        deliver(c_str.as_ptr());
    }
}

// ── Platform callbacks ───────────────────────────────────────────────────

/// Ask the host to call `registerForRemoteNotifications`.
type RegisterCallback = unsafe extern "C" fn();

/// Ask the host to show the permission prompt. `kinds_json` is an array such
/// as `["alert","badge"]`.
type PermissionCallback = unsafe extern "C" fn(kinds_json: *const c_char);

#[derive(Clone, Copy)]
struct PlatformCallbacks {
    register: RegisterCallback,
    permission: PermissionCallback,
}

static PLATFORM_CALLBACKS: OnceLock<PlatformCallbacks> = OnceLock::new();

/// Platform adapter backed by host callbacks. Requests may arrive on a
/// runtime worker thread; the host is expected to hop to its main thread.
struct HostPlatform;

impl PushPlatform for HostPlatform {
    fn request_token_registration(&self) {
        match PLATFORM_CALLBACKS.get() {
            Some(callbacks) => {
                emit_log("INFO", "bridge.platform", "Requesting device token from host");
                // SAFETY: registered function pointer, valid for the process.
                unsafe { (callbacks.register)() }
            },
            None => emit_log(
                "WARN",
                "bridge.platform",
                "Token registration requested before platform callbacks were set",
            ),
        }
    }

    fn request_notification_permission(&self, kinds: &NotificationKinds) {
        let Some(callbacks) = PLATFORM_CALLBACKS.get() else {
            emit_log(
                "WARN",
                "bridge.platform",
                "Permission requested before platform callbacks were set",
            );
            return;
        };
        send_c_string(encode_json(kinds), |ptr| {
            // SAFETY: registered function pointer; ptr valid during the call.
            unsafe { (callbacks.permission)(ptr) }
        });
    }
}

// ── Push and change callbacks ────────────────────────────────────────────

/// Receives each push as `{"payload":{...},"appActive":bool,"origin":"live"|"launch"}`.
type PushCallback = unsafe extern "C" fn(push_json: *const c_char);

/// Invoked whenever subscriptions may have changed.
type ChangeCallback = unsafe extern "C" fn();

// ── Request / Response types ───────────────────────────────────────────────

fn default_trigger() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SetSubscriptionRequest {
    channel: Channel,
    subscribed: bool,
    #[serde(default = "default_trigger")]
    trigger_handler: bool,
}

#[derive(Debug, Deserialize)]
struct SubscriptionStatusRequest {
    channel: Channel,
    #[serde(default = "default_trigger")]
    trigger_handler: bool,
}

#[derive(Debug, Deserialize)]
struct ListSubscriptionsRequest {
    #[serde(default)]
    offset: u32,
    #[serde(default = "default_page")]
    count: u32,
    #[serde(default = "default_trigger")]
    trigger_handler: bool,
}

fn default_page() -> u32 {
    ChannelRange::default().count
}

#[derive(Debug, Deserialize)]
struct PermissionRequest {
    #[serde(default = "NotificationKinds::all")]
    kinds: NotificationKinds,
}

#[derive(Debug, Serialize)]
struct VersionResponse {
    bridge_version: &'static str,
    config_dir: String,
}

#[derive(Debug, Serialize)]
struct SubscriptionStatusResponse {
    subscribed: bool,
}

#[derive(Debug, Serialize)]
struct ChannelsResponse {
    channels: Vec<Channel>,
}

#[derive(Debug, Serialize)]
struct TokenResponse {
    token: Option<String>,
    state: &'static str,
}

#[derive(Debug, Serialize)]
struct DeliveryResponse {
    delivery: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorPayload<'a>,
}

#[derive(Debug, Serialize)]
struct ErrorPayload<'a> {
    code: &'a str,
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct OkResponse {
    ok: bool,
}

// ── Encoding helpers ───────────────────────────────────────────────────────

fn encode_json<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => json,
        Err(_) => {
            "{\"error\":{\"code\":\"serialization_error\",\"message\":\"failed to serialize response\"}}"
                .to_owned()
        },
    }
}

fn encode_error(code: &str, message: &str) -> String {
    encode_json(&ErrorEnvelope {
        error: ErrorPayload { code, message },
    })
}

fn encode_push_error(error: &PushError) -> String {
    encode_error(error.kind().as_str(), &error.to_string())
}

fn encode_result<T: Serialize>(result: Result<T, PushError>) -> String {
    match result {
        Ok(value) => encode_json(&value),
        Err(error) => encode_push_error(&error),
    }
}

fn delivery_name(delivery: Delivery) -> &'static str {
    match delivery {
        Delivery::Delivered => "delivered",
        Delivery::Queued => "queued",
        Delivery::Dropped => "dropped",
    }
}

fn into_c_ptr(payload: String) -> *mut c_char {
    match CString::new(payload) {
        Ok(value) => value.into_raw(),
        Err(_) => std::ptr::null_mut(),
    }
}

fn with_ffi_boundary<F>(work: F) -> *mut c_char
where
    F: FnOnce() -> String,
{
    match catch_unwind(AssertUnwindSafe(work)) {
        Ok(payload) => into_c_ptr(payload),
        Err(_) => into_c_ptr(encode_error(
            "panic",
            "unexpected panic occurred in Rust FFI boundary",
        )),
    }
}

fn read_c_string(ptr: *const c_char) -> Result<String, String> {
    if ptr.is_null() {
        return Err("request_json pointer was null".to_owned());
    }

    // SAFETY: pointer nullability is checked above, and callers guarantee a
    // valid NUL-terminated C string for the duration of the call.
    let c_str = unsafe { CStr::from_ptr(ptr) };
    match c_str.to_str() {
        Ok(text) => Ok(text.to_owned()),
        Err(_) => Err("request_json was not valid UTF-8".to_owned()),
    }
}

/// Read and parse a JSON request, recording the failure kind.
fn parse_request<T: serde::de::DeserializeOwned>(
    function: &'static str,
    ptr: *const c_char,
) -> Result<T, String> {
    let raw = read_c_string(ptr).map_err(|message| {
        record_error(function, "null_pointer_or_invalid_utf8");
        encode_error("null_pointer_or_invalid_utf8", &message)
    })?;
    serde_json::from_str::<T>(&raw).map_err(|e| {
        record_error(function, "invalid_json");
        encode_error("invalid_json", &e.to_string())
    })
}

fn config_dir_string() -> String {
    pushsub_config::config_dir()
        .map(|dir| dir.display().to_string())
        .unwrap_or_default()
}

// ── Completion callbacks ─────────────────────────────────────────────────

/// Delivers the single result of an asynchronous call.
type CompletionCallback = unsafe extern "C" fn(result_json: *const c_char, user_data: *mut c_void);

/// Callback + user_data that can cross the `spawn` boundary.
///
/// # Safety
///
/// The host guarantees that `user_data` stays valid until the completion is
/// delivered and that the callback is a plain function pointer.
struct CompletionCtx {
    callback: CompletionCallback,
    user_data: *mut c_void,
}

// SAFETY: see struct doc. The completion fires exactly once, so `user_data`
// is never touched concurrently.
unsafe impl Send for CompletionCtx {}

impl CompletionCtx {
    fn complete(self, payload: String) {
        send_c_string(payload, |ptr| {
            // SAFETY: `ptr` is valid NUL-terminated for the call, `user_data`
            // is retained by the host until this completion.
            unsafe { (self.callback)(ptr, self.user_data) }
        });
    }
}

// ── Metrics / tracing helpers ──────────────────────────────────────────────

#[cfg(feature = "metrics")]
fn record_call(function: &'static str) {
    metrics::counter!("pushsub_swift_bridge_calls_total", "function" => function).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_call(_function: &'static str) {}

#[cfg(feature = "metrics")]
fn record_error(function: &'static str, code: &'static str) {
    metrics::counter!(
        "pushsub_swift_bridge_errors_total",
        "function" => function,
        "code" => code
    )
    .increment(1);
}

#[cfg(not(feature = "metrics"))]
fn record_error(_function: &'static str, _code: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_call(function: &'static str) {
    tracing::debug!(target: "pushsub_swift_bridge", function, "ffi call");
}

#[cfg(not(feature = "tracing"))]
fn trace_call(_function: &'static str) {}

// ── FFI exports: service ───────────────────────────────────────────────────

#[unsafe(no_mangle)]
pub extern "C" fn pushsub_version() -> *mut c_char {
    record_call("pushsub_version");
    trace_call("pushsub_version");

    with_ffi_boundary(|| {
        encode_json(&VersionResponse {
            bridge_version: env!("CARGO_PKG_VERSION"),
            config_dir: config_dir_string(),
        })
    })
}

/// Set the backend target from `{"server":"...","port":4040}`.
/// Returns `{"ok":true}` or an error envelope.
#[unsafe(no_mangle)]
pub extern "C" fn pushsub_connect(request_json: *const c_char) -> *mut c_char {
    record_call("pushsub_connect");
    trace_call("pushsub_connect");

    with_ffi_boundary(|| {
        let config = match parse_request::<ConnectionConfig>("pushsub_connect", request_json) {
            Ok(config) => config,
            Err(payload) => return payload,
        };
        let target = config.to_string();
        match BRIDGE.service.configure_with(config) {
            Ok(()) => {
                emit_log("INFO", "bridge", &format!("Connected to {target}"));
                encode_json(&OkResponse { ok: true })
            },
            Err(error) => {
                record_error("pushsub_connect", error.kind().as_str());
                encode_push_error(&error)
            },
        }
    })
}

/// Subscribe or unsubscribe. Request:
/// `{"channel":"news","subscribed":true,"trigger_handler":true}`.
/// Completion receives `{"ok":true}` or an error envelope.
///
/// # Safety
///
/// * `request_json` must be a valid NUL-terminated C string or null.
/// * `callback` must remain valid until the completion is delivered.
/// * `user_data` must remain valid until the completion is delivered.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pushsub_set_subscription(
    request_json: *const c_char,
    callback: CompletionCallback,
    user_data: *mut c_void,
) {
    record_call("pushsub_set_subscription");
    trace_call("pushsub_set_subscription");

    let ctx = CompletionCtx {
        callback,
        user_data,
    };
    let request =
        match parse_request::<SetSubscriptionRequest>("pushsub_set_subscription", request_json) {
            Ok(request) => request,
            Err(payload) => return ctx.complete(payload),
        };

    BRIDGE.runtime.spawn(async move {
        let options = CallOptions {
            trigger_handler: request.trigger_handler,
        };
        let result = BRIDGE
            .service
            .set_subscription(&request.channel, request.subscribed, options)
            .await
            .map(|()| OkResponse { ok: true });
        ctx.complete(encode_result(result));
    });
}

/// Query one channel. Request: `{"channel":"news"}`.
/// Completion receives `{"subscribed":bool}` or an error envelope.
///
/// # Safety
///
/// Same contract as [`pushsub_set_subscription`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pushsub_subscription_status(
    request_json: *const c_char,
    callback: CompletionCallback,
    user_data: *mut c_void,
) {
    record_call("pushsub_subscription_status");
    trace_call("pushsub_subscription_status");

    let ctx = CompletionCtx {
        callback,
        user_data,
    };
    let request = match parse_request::<SubscriptionStatusRequest>(
        "pushsub_subscription_status",
        request_json,
    ) {
        Ok(request) => request,
        Err(payload) => return ctx.complete(payload),
    };

    BRIDGE.runtime.spawn(async move {
        let options = CallOptions {
            trigger_handler: request.trigger_handler,
        };
        let result = BRIDGE
            .service
            .subscription_status(&request.channel, options)
            .await
            .map(|subscribed| SubscriptionStatusResponse { subscribed });
        ctx.complete(encode_result(result));
    });
}

/// List subscribed channels. Request: `{"offset":0,"count":50}`.
/// Completion receives `{"channels":[...]}` or an error envelope.
///
/// # Safety
///
/// Same contract as [`pushsub_set_subscription`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pushsub_list_subscriptions(
    request_json: *const c_char,
    callback: CompletionCallback,
    user_data: *mut c_void,
) {
    record_call("pushsub_list_subscriptions");
    trace_call("pushsub_list_subscriptions");

    let ctx = CompletionCtx {
        callback,
        user_data,
    };
    let request = match parse_request::<ListSubscriptionsRequest>(
        "pushsub_list_subscriptions",
        request_json,
    ) {
        Ok(request) => request,
        Err(payload) => return ctx.complete(payload),
    };

    BRIDGE.runtime.spawn(async move {
        let range = ChannelRange::new(request.offset, request.count);
        let options = CallOptions {
            trigger_handler: request.trigger_handler,
        };
        let result = BRIDGE
            .service
            .list_subscriptions(range, options)
            .await
            .map(|channels| ChannelsResponse { channels });
        ctx.complete(encode_result(result));
    });
}

/// Request display permission. Request: `{"kinds":["alert","badge"]}`.
/// Completion receives `{"granted":[...],"wasRequested":bool|null}`.
///
/// # Safety
///
/// Same contract as [`pushsub_set_subscription`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pushsub_request_permission(
    request_json: *const c_char,
    callback: CompletionCallback,
    user_data: *mut c_void,
) {
    record_call("pushsub_request_permission");
    trace_call("pushsub_request_permission");

    let ctx = CompletionCtx {
        callback,
        user_data,
    };
    let request =
        match parse_request::<PermissionRequest>("pushsub_request_permission", request_json) {
            Ok(request) => request,
            Err(payload) => return ctx.complete(payload),
        };

    BRIDGE.runtime.spawn(async move {
        let outcome = BRIDGE.service.request_permission(&request.kinds).await;
        ctx.complete(encode_json(&outcome));
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn pushsub_push_token() -> *mut c_char {
    record_call("pushsub_push_token");
    trace_call("pushsub_push_token");

    with_ffi_boundary(|| {
        encode_json(&TokenResponse {
            token: BRIDGE.service.current_token().map(|token| token.to_hex()),
            state: BRIDGE.service.token_state().as_str(),
        })
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn pushsub_is_push_enabled() -> bool {
    record_call("pushsub_is_push_enabled");
    catch_unwind(|| BRIDGE.service.is_push_enabled_by_system()).unwrap_or(false)
}

// ── FFI exports: platform hooks ────────────────────────────────────────────

/// Forward `didRegisterForRemoteNotificationsWithDeviceToken`.
///
/// # Safety
///
/// `token` must point to `len` readable bytes, or be null when `len` is 0.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pushsub_did_register_token(token: *const u8, len: usize) {
    record_call("pushsub_did_register_token");
    trace_call("pushsub_did_register_token");

    let bytes = if token.is_null() || len == 0 {
        Vec::new()
    } else {
        // SAFETY: caller guarantees `len` readable bytes at `token`.
        unsafe { std::slice::from_raw_parts(token, len) }.to_vec()
    };
    if catch_unwind(|| BRIDGE.service.on_token_registered(DeviceToken::new(bytes))).is_err() {
        emit_log("ERROR", "bridge", "Panic while storing device token");
    }
}

/// Forward `didFailToRegisterForRemoteNotificationsWithError`.
/// `message` may be null.
#[unsafe(no_mangle)]
pub extern "C" fn pushsub_did_fail_to_register(message: *const c_char) {
    record_call("pushsub_did_fail_to_register");
    trace_call("pushsub_did_fail_to_register");

    let reason = read_c_string(message)
        .unwrap_or_else(|_| "platform registration failed".to_owned());
    emit_log("WARN", "bridge", &format!("Token registration failed: {reason}"));
    if catch_unwind(|| BRIDGE.service.on_token_registration_failed(reason)).is_err() {
        emit_log("ERROR", "bridge", "Panic while recording registration failure");
    }
}

/// The platform withdrew the device token.
#[unsafe(no_mangle)]
pub extern "C" fn pushsub_did_revoke_token() {
    record_call("pushsub_did_revoke_token");
    trace_call("pushsub_did_revoke_token");

    if catch_unwind(|| BRIDGE.service.on_token_revoked()).is_err() {
        emit_log("ERROR", "bridge", "Panic while revoking device token");
    }
}

/// Report the permission prompt's answer as a JSON array of granted kinds.
/// Returns `{"ok":true}` or an error envelope.
#[unsafe(no_mangle)]
pub extern "C" fn pushsub_permission_finished(granted_json: *const c_char) -> *mut c_char {
    record_call("pushsub_permission_finished");
    trace_call("pushsub_permission_finished");

    with_ffi_boundary(|| {
        let granted =
            match parse_request::<NotificationKinds>("pushsub_permission_finished", granted_json) {
                Ok(granted) => granted,
                Err(payload) => return payload,
            };
        BRIDGE.service.on_permission_request_finished(granted);
        encode_json(&OkResponse { ok: true })
    })
}

/// Forward `didReceiveRemoteNotification`. Returns
/// `{"delivery":"delivered"|"queued"|"dropped"}`.
#[unsafe(no_mangle)]
pub extern "C" fn pushsub_handle_push(payload_json: *const c_char, app_active: bool) -> *mut c_char {
    record_call("pushsub_handle_push");
    trace_call("pushsub_handle_push");

    with_ffi_boundary(|| {
        let payload = match parse_request::<Map<String, Value>>("pushsub_handle_push", payload_json)
        {
            Ok(payload) => payload,
            Err(payload) => return payload,
        };
        let delivery = BRIDGE.service.handle_push(payload, app_active);
        encode_json(&DeliveryResponse {
            delivery: delivery_name(delivery),
        })
    })
}

/// Forward the app's launch options. When they carry a remote notification
/// it is delivered as a launch push; otherwise returns `{"delivery":"none"}`.
#[unsafe(no_mangle)]
pub extern "C" fn pushsub_handle_launch_options(options_json: *const c_char) -> *mut c_char {
    record_call("pushsub_handle_launch_options");
    trace_call("pushsub_handle_launch_options");

    with_ffi_boundary(|| {
        let mut options = match parse_request::<Map<String, Value>>(
            "pushsub_handle_launch_options",
            options_json,
        ) {
            Ok(options) => options,
            Err(payload) => return payload,
        };
        let delivery = match options.remove(LAUNCH_NOTIFICATION_KEY) {
            Some(Value::Object(payload)) => {
                emit_log("INFO", "bridge", "App launched from a push notification");
                delivery_name(BRIDGE.service.handle_launch_push(payload))
            },
            _ => "none",
        };
        encode_json(&DeliveryResponse { delivery })
    })
}

// ── FFI exports: callbacks ─────────────────────────────────────────────────

/// Register the host's platform hooks. Only the first call takes effect.
///
/// # Safety
///
/// Both callbacks must be valid function pointers for the lifetime of the
/// process. They may be invoked from a background thread.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pushsub_set_platform_callbacks(
    register: RegisterCallback,
    permission: PermissionCallback,
) {
    if PLATFORM_CALLBACKS
        .set(PlatformCallbacks {
            register,
            permission,
        })
        .is_ok()
    {
        emit_log("INFO", "bridge", "Platform callbacks registered");
    }
}

/// Install the push handler, replacing any previous one. Pushes received
/// before any handler was installed are delivered to it immediately.
///
/// # Safety
///
/// `callback` must be a valid function pointer for the lifetime of the
/// process. Rust owns the JSON pointer; the callback must copy it.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pushsub_set_push_handler(callback: PushCallback) {
    let flushed = BRIDGE
        .service
        .set_push_handler(move |push: &PushNotification| {
            send_c_string(encode_json(push), |ptr| {
                // SAFETY: registered function pointer; ptr valid for the call.
                unsafe { callback(ptr) }
            });
        });
    let mut fields = HashMap::new();
    fields.insert("flushed", flushed.to_string());
    emit_log_with_fields("INFO", "bridge", "Push handler registered", Some(&fields));
}

/// Install the subscriptions-changed callback, replacing any previous one.
///
/// # Safety
///
/// `callback` must be a valid function pointer for the lifetime of the
/// process.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pushsub_set_change_callback(callback: ChangeCallback) {
    let replaced = BRIDGE
        .service
        .replace_change_observer(*CHANGE_CONTEXT, move || {
            // SAFETY: registered function pointer, valid for the process.
            unsafe { callback() }
        });
    let message = if replaced > 0 {
        "Change callback replaced"
    } else {
        "Change callback registered"
    };
    emit_log("INFO", "bridge", message);
}

/// Register a callback to receive log events from the Rust bridge.
/// Only the first call takes effect; subsequent calls are ignored.
///
/// # Safety
///
/// `callback` must be a valid function pointer that remains valid for
/// the lifetime of the process.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn pushsub_set_log_callback(callback: LogCallback) {
    let _ = LOG_CALLBACK.set(callback);
    emit_log("INFO", "bridge", "Log callback registered");
}

#[unsafe(no_mangle)]
/// # Safety
///
/// `ptr` must either be null or a pointer previously returned by one of the
/// `pushsub_*` FFI functions from this crate. Passing any other pointer, or
/// freeing the same pointer more than once, is undefined behavior.
pub unsafe extern "C" fn pushsub_free_string(ptr: *mut c_char) {
    record_call("pushsub_free_string");

    if ptr.is_null() {
        return;
    }

    // SAFETY: pointer must originate from `CString::into_raw` in this crate.
    let _ = unsafe { CString::from_raw(ptr) };
}

#[unsafe(no_mangle)]
pub extern "C" fn pushsub_shutdown() {
    record_call("pushsub_shutdown");
    trace_call("pushsub_shutdown");
    emit_log("INFO", "bridge", "Shutdown requested");
    let _ = BRIDGE.service.clear_push_handler();
    let _ = BRIDGE.service.remove_change_observers(*CHANGE_CONTEXT);
}
