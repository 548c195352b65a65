//! Registers the service worker and hands a push subscription to the server.

use crate::{key, PlatformError};
use async_trait::async_trait;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::fmt;
use tracing::{error, info, trace, trace_span, warn, Instrument};

/// Where the service worker script is served, registered with its default scope.
pub const SERVICE_WORKER_URL: &str = "/service-worker.js";

/// Where the serialized subscription is posted.
pub const SAVE_SUBSCRIPTION_URL: &str = "/save-subscription";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub vapid_public_key: Option<String>,
    pub service_worker_url: String,
    pub save_subscription_url: String,
}

impl Config {
    pub fn new(vapid_public_key: Option<String>) -> Self {
        Self {
            vapid_public_key,
            service_worker_url: SERVICE_WORKER_URL.into(),
            save_subscription_url: SAVE_SUBSCRIPTION_URL.into(),
        }
    }
}

/// The browser features the workflow depends on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub service_worker: bool,
    pub push_manager: bool,
}

/// Reports whether the workflow can run at all, warning when it can't.
pub fn is_supported(capabilities: Capabilities) -> bool {
    let Capabilities {
        service_worker,
        push_manager,
    } = capabilities;

    let supported = service_worker && push_manager;
    if !supported {
        warn!("This browser does not support push notifications");
    }
    supported
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Permission {
    Granted,
    Denied,
    Default,
}

impl Permission {
    /// Parses the value `Notification.requestPermission` resolves to.
    pub fn from_browser(value: &str) -> Option<Self> {
        match value {
            "granted" => Some(Self::Granted),
            "denied" => Some(Self::Denied),
            "default" => Some(Self::Default),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Default => "default",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub user_visible_only: bool,
    pub application_server_key: Vec<u8>,
}

/// The browser's subscription, already serialized to JSON.
///
/// The client never looks inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializedSubscription(pub String);

pub trait Registration {
    fn scope(&self) -> String;
}

/// The browser operations the workflow is built from.
#[async_trait(?Send)]
pub trait PushPlatform {
    type Registration: Registration;

    async fn register_service_worker(
        &self,
        script_url: &str,
    ) -> Result<Self::Registration, PlatformError>;

    async fn request_permission(&self) -> Result<Permission, PlatformError>;

    async fn subscribe(
        &self,
        registration: &Self::Registration,
        options: &SubscribeOptions,
    ) -> Result<SerializedSubscription, PlatformError>;

    /// POSTs `body` with `content-type: application/json`, returning the
    /// response status.
    async fn post_json(&self, url: &str, body: &str) -> Result<u16, PlatformError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribed {
    pub scope: String,
    pub status: u16,
}

/// Runs every step in order, stopping at the first one that fails.
pub async fn run<P>(config: &Config, platform: &P) -> Result<Subscribed>
where
    P: PushPlatform + ?Sized,
{
    let Config {
        vapid_public_key,
        service_worker_url,
        save_subscription_url,
    } = config;

    let s = trace_span!("push_workflow", service_worker_url = %service_worker_url);

    async {
        let vapid_public_key = vapid_public_key.as_deref().context(MissingVapidKeySnafu)?;
        trace!("VAPID key found");

        trace!("Registering service worker");
        let registration = platform
            .register_service_worker(service_worker_url)
            .await
            .context(UnableToRegisterSnafu)?;
        let scope = registration.scope();
        info!("Service worker registered with scope {}", scope);

        let permission = platform
            .request_permission()
            .await
            .context(UnableToRequestPermissionSnafu)?;
        ensure!(
            permission == Permission::Granted,
            PermissionNotGrantedSnafu { permission }
        );
        trace!("Notification permission granted");

        let options = SubscribeOptions {
            user_visible_only: true,
            application_server_key: key::url_base64_to_bytes(vapid_public_key)
                .context(InvalidVapidKeySnafu)?,
        };
        let subscription = platform
            .subscribe(&registration, &options)
            .await
            .context(UnableToSubscribeSnafu)?;
        trace!("Subscribed to the push service");

        let status = platform
            .post_json(save_subscription_url, &subscription.0)
            .await
            .context(UnableToSendSubscriptionSnafu)?;
        ensure!(
            (200..300).contains(&status),
            SubscriptionRejectedSnafu { status }
        );

        Ok(Subscribed { scope, status })
    }
    .instrument(s)
    .await
}

/// Runs the workflow and logs how it ended. Failures never escape.
pub async fn bootstrap<P>(config: &Config, platform: &P)
where
    P: PushPlatform + ?Sized,
{
    match run(config, platform).await {
        Ok(Subscribed { scope, .. }) => {
            info!("Subscription for {} sent to the server", scope);
        }
        Err(e @ Error::MissingVapidKey) => error!("{}, not subscribing", e),
        Err(e @ Error::PermissionNotGranted { .. }) => warn!("{}", e),
        Err(e @ Error::SubscriptionRejected { .. }) => error!("{}", e),
        Err(e) => error!("Push subscription failed: {}", Chain(&e)),
    }
}

struct Chain<'a>(&'a (dyn std::error::Error + 'static));

impl fmt::Display for Chain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)?;
        let mut source = self.0.source();
        while let Some(e) = source {
            write!(f, ": {}", e)?;
            source = e.source();
        }
        Ok(())
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("No VAPID public key was provided"))]
    MissingVapidKey,

    #[snafu(display("Unable to register the service worker"))]
    UnableToRegister { source: PlatformError },

    #[snafu(display("Unable to request notification permission"))]
    UnableToRequestPermission { source: PlatformError },

    #[snafu(display("Notification permission was not granted ({})", permission))]
    PermissionNotGranted { permission: Permission },

    #[snafu(display("The VAPID public key is invalid"))]
    InvalidVapidKey { source: key::Error },

    #[snafu(display("Unable to subscribe to the push service"))]
    UnableToSubscribe { source: PlatformError },

    #[snafu(display("Unable to send the subscription to the server"))]
    UnableToSendSubscription { source: PlatformError },

    #[snafu(display("The server rejected the subscription with status {}", status))]
    SubscriptionRejected { status: u16 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
