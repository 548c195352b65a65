//! web-sys backed implementations and the exports the page and the
//! service worker call into.

use crate::{
    service_worker::{self, Notification, NotificationSink},
    workflow::{
        self, Capabilities, Config, Permission, PushPlatform, Registration,
        SerializedSubscription, SubscribeOptions,
    },
    PlatformError,
};
use async_trait::async_trait;
use js_sys::{Promise, Reflect, Uint8Array, JSON};
use tracing::error;
use wasm_bindgen::{prelude::*, JsCast};
use wasm_bindgen_futures::{future_to_promise, spawn_local, JsFuture};
use web_sys::{
    Headers, NotificationOptions, PushEvent, PushSubscription, PushSubscriptionOptionsInit,
    Request, RequestInit, Response, ServiceWorkerGlobalScope, ServiceWorkerRegistration, Window,
};

#[wasm_bindgen(start)]
pub fn initialize() {
    console_error_panic_hook::set_once();
    // Both the page and the worker instantiate the module; a second
    // subscriber is not an error worth reporting.
    let _ = tracing_wasm::try_set_as_global_default();
}

/// Subscribes this browser once the page has finished loading.
#[wasm_bindgen]
pub fn start(vapid_public_key: Option<String>) -> Result<(), JsValue> {
    let window = web_sys::window().ok_or_else(|| JsValue::from_str("No window available"))?;

    let capabilities = Capabilities {
        service_worker: Reflect::has(&window.navigator(), &"serviceWorker".into())?,
        push_manager: Reflect::has(&window, &"PushManager".into())?,
    };
    if !workflow::is_supported(capabilities) {
        return Ok(());
    }

    let config = Config::new(vapid_public_key);
    let platform = BrowserPlatform {
        window: window.clone(),
    };
    let run = move || {
        spawn_local(async move {
            workflow::bootstrap(&config, &platform).await;
        })
    };

    let loaded = window.document().map_or(false, |d| is_loaded(&d.ready_state()));

    if loaded {
        run();
    } else {
        let callback = Closure::once_into_js(run);
        window.add_event_listener_with_callback("load", callback.unchecked_ref())?;
    }

    Ok(())
}

/// Handles one push event; the worker script passes the returned promise
/// to `waitUntil`.
#[wasm_bindgen(js_name = onPush)]
pub fn on_push(scope: ServiceWorkerGlobalScope, event: PushEvent) -> Promise {
    let payload = event.data().map(|d| d.text());
    let sink = RegistrationSink(scope.registration());

    future_to_promise(async move {
        if let Err(e) = service_worker::handle_push(payload.as_deref(), &sink).await {
            error!("Unable to handle push message: {}", e);
        }
        Ok(JsValue::UNDEFINED)
    })
}

struct BrowserPlatform {
    window: Window,
}

impl Registration for ServiceWorkerRegistration {
    fn scope(&self) -> String {
        ServiceWorkerRegistration::scope(self)
    }
}

#[async_trait(?Send)]
impl PushPlatform for BrowserPlatform {
    type Registration = ServiceWorkerRegistration;

    async fn register_service_worker(
        &self,
        script_url: &str,
    ) -> Result<ServiceWorkerRegistration, PlatformError> {
        let container = self.window.navigator().service_worker();
        resolve(container.register(script_url)).await
    }

    async fn request_permission(&self) -> Result<Permission, PlatformError> {
        let promise = web_sys::Notification::request_permission().map_err(js_error)?;
        let value = JsFuture::from(promise).await.map_err(js_error)?;

        permission(&value)
    }

    async fn subscribe(
        &self,
        registration: &ServiceWorkerRegistration,
        options: &SubscribeOptions,
    ) -> Result<SerializedSubscription, PlatformError> {
        let SubscribeOptions {
            user_visible_only,
            application_server_key,
        } = options;

        let key: JsValue = Uint8Array::from(&application_server_key[..]).into();
        let init = PushSubscriptionOptionsInit::new();
        init.set_user_visible_only(*user_visible_only);
        init.set_application_server_key(&key);

        let push_manager = registration.push_manager().map_err(js_error)?;
        let promise = push_manager
            .subscribe_with_options(&init)
            .map_err(js_error)?;
        let subscription: PushSubscription = resolve(promise).await?;

        let json = JSON::stringify(&subscription).map_err(js_error)?;
        Ok(SerializedSubscription(json.into()))
    }

    async fn post_json(&self, url: &str, body: &str) -> Result<u16, PlatformError> {
        let headers = Headers::new().map_err(js_error)?;
        headers
            .set("content-type", "application/json")
            .map_err(js_error)?;

        let init = RequestInit::new();
        init.set_method("POST");
        init.set_body(&JsValue::from_str(body));
        init.set_headers(&headers);

        let request = Request::new_with_str_and_init(url, &init).map_err(js_error)?;
        let response: Response = resolve(self.window.fetch_with_request(&request)).await?;

        Ok(response.status())
    }
}

struct RegistrationSink(ServiceWorkerRegistration);

#[async_trait(?Send)]
impl NotificationSink for RegistrationSink {
    async fn show(&self, notification: &Notification) -> Result<(), PlatformError> {
        let Notification { title, body, icon } = notification;

        let options = NotificationOptions::new();
        options.set_body(body);
        options.set_icon(icon);

        let promise = self
            .0
            .show_notification_with_options(title, &options)
            .map_err(js_error)?;
        JsFuture::from(promise).await.map_err(js_error)?;

        Ok(())
    }
}

fn is_loaded(ready_state: &str) -> bool {
    ready_state == "complete"
}

fn permission(value: &JsValue) -> Result<Permission, PlatformError> {
    value
        .as_string()
        .as_deref()
        .and_then(Permission::from_browser)
        .ok_or_else(|| PlatformError::new(format!("Unknown permission {:?}", value)))
}

async fn resolve<T: JsCast>(promise: Promise) -> Result<T, PlatformError> {
    let value = JsFuture::from(promise).await.map_err(js_error)?;
    value
        .dyn_into()
        .map_err(|v| PlatformError::new(format!("Unexpected value {:?}", v)))
}

fn js_error(value: JsValue) -> PlatformError {
    match value.dyn_ref::<js_sys::Error>() {
        Some(e) => PlatformError::new(String::from(e.message())),
        None => PlatformError::new(format!("{:?}", value)),
    }
}
