//! Turns incoming push messages into notifications.

use crate::PlatformError;
use async_trait::async_trait;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt, Snafu};
use tracing::trace;

pub const NOTIFICATION_ICON_URL: &str = "https://img.icons8.com/fluency/48/heart-with-pulse.png";

/// The JSON payload the server pushes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PushMessage {
    pub title: String,
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub icon: &'static str,
}

impl From<PushMessage> for Notification {
    fn from(other: PushMessage) -> Self {
        let PushMessage { title, body } = other;
        Self {
            title,
            body,
            icon: NOTIFICATION_ICON_URL,
        }
    }
}

#[async_trait(?Send)]
pub trait NotificationSink {
    async fn show(&self, notification: &Notification) -> Result<(), PlatformError>;
}

/// Displays one notification for one push message.
pub async fn handle_push<S>(payload: Option<&str>, sink: &S) -> Result<()>
where
    S: NotificationSink + ?Sized,
{
    let payload = payload.context(MissingPayloadSnafu)?;
    let message: PushMessage = serde_json::from_str(payload).context(InvalidPayloadSnafu)?;
    trace!("Push received");

    let notification = Notification::from(message);
    sink.show(&notification)
        .await
        .context(UnableToShowNotificationSnafu)
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("The push message carried no data"))]
    MissingPayload,

    #[snafu(display("The push message is not a valid notification"))]
    InvalidPayload { source: serde_json::Error },

    #[snafu(display("Unable to show the notification"))]
    UnableToShowNotification { source: PlatformError },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use super::*;
    use futures::executor::block_on;
    use std::cell::RefCell;

    #[derive(Default)]
    struct RecordingSink {
        shown: RefCell<Vec<Notification>>,
        broken: bool,
    }

    #[async_trait(?Send)]
    impl NotificationSink for RecordingSink {
        async fn show(&self, notification: &Notification) -> Result<(), PlatformError> {
            self.shown.borrow_mut().push(notification.clone());
            if self.broken {
                Err(PlatformError::new("no registration"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn shows_exactly_one_notification() {
        let sink = RecordingSink::default();

        block_on(handle_push(Some(r#"{"title":"T","body":"B"}"#), &sink)).unwrap();

        assert_eq!(
            *sink.shown.borrow(),
            [Notification {
                title: "T".into(),
                body: "B".into(),
                icon: NOTIFICATION_ICON_URL,
            }]
        );
    }

    #[test]
    fn body_is_optional() {
        let sink = RecordingSink::default();

        block_on(handle_push(Some(r#"{"title":"Reminder"}"#), &sink)).unwrap();

        let shown = sink.shown.borrow();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "Reminder");
        assert_eq!(shown[0].body, "");
    }

    #[test]
    fn empty_push_shows_nothing() {
        let sink = RecordingSink::default();

        let r = block_on(handle_push(None, &sink));

        assert!(matches!(r, Err(Error::MissingPayload)));
        assert!(sink.shown.borrow().is_empty());
    }

    #[test]
    fn malformed_payload_shows_nothing() {
        let sink = RecordingSink::default();

        for payload in ["plain text", r#"{"body":"no title"}"#, "[]"] {
            let r = block_on(handle_push(Some(payload), &sink));
            assert!(matches!(r, Err(Error::InvalidPayload { .. })), "{}", payload);
        }
        assert!(sink.shown.borrow().is_empty());
    }

    #[test]
    fn display_failures_are_reported() {
        let sink = RecordingSink {
            broken: true,
            ..Default::default()
        };

        let r = block_on(handle_push(Some(r#"{"title":"T","body":"B"}"#), &sink));

        assert!(matches!(r, Err(Error::UnableToShowNotification { .. })));
    }
}
