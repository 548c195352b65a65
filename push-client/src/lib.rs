#![deny(rust_2018_idioms)]

//! Browser side of the push relay.
//!
//! The page runs [`workflow::bootstrap`] to register the service worker and
//! hand its push subscription to the server. The service worker runs
//! [`service_worker::handle_push`] for every push message it receives.
//!
//! Everything that touches the browser lives behind the [`workflow::PushPlatform`]
//! and [`service_worker::NotificationSink`] traits; the wasm32 build supplies
//! web-sys implementations of both.

pub mod key;
pub mod service_worker;
pub mod workflow;

#[cfg(target_arch = "wasm32")]
mod browser;

pub use workflow::{SAVE_SUBSCRIPTION_URL, SERVICE_WORKER_URL};

use snafu::Snafu;

/// A failure reported by the host environment.
///
/// Browser APIs reject with arbitrary JavaScript values, so only a
/// rendered message survives.
#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(display("{}", message))]
pub struct PlatformError {
    message: String,
}

impl PlatformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
