use push_client::key::{self, url_base64_to_bytes, VAPID_PUBLIC_KEY_LEN};
use serde::{Deserialize, Serialize};
use snafu::{ensure, ResultExt, Snafu};
use url::Url;

const AUTH_SECRET_LEN: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint(pub Url);

/// A push subscription as the browser serializes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub endpoint: Endpoint,
    #[serde(default)]
    pub expiration_time: Option<f64>,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

impl Subscription {
    /// Checks that the keys are something a push message could be
    /// encrypted for.
    pub fn validate(&self) -> Result<()> {
        let SubscriptionKeys { p256dh, auth } = &self.keys;

        let p256dh = url_base64_to_bytes(p256dh).context(UndecodableKeySnafu { name: "p256dh" })?;
        ensure!(
            p256dh.len() == VAPID_PUBLIC_KEY_LEN,
            WrongKeyLengthSnafu {
                name: "p256dh",
                length: p256dh.len(),
            }
        );

        let auth = url_base64_to_bytes(auth).context(UndecodableKeySnafu { name: "auth" })?;
        ensure!(
            auth.len() == AUTH_SECRET_LEN,
            WrongKeyLengthSnafu {
                name: "auth",
                length: auth.len(),
            }
        );

        Ok(())
    }
}

/// A subscription as it was stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSubscription {
    pub endpoint: Endpoint,
    pub json: String,
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("The {} key is not valid base64url", name))]
    UndecodableKey {
        source: key::Error,
        name: &'static str,
    },

    #[snafu(display("The {} key has an unexpected length of {} bytes", name, length))]
    WrongKeyLength { name: &'static str, length: usize },
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use super::*;

    const BROWSER_JSON: &str = r#"{
        "endpoint": "https://fcm.googleapis.com/fcm/send/dGVzdA:APA91b",
        "expirationTime": null,
        "keys": {
            "p256dh": "BEl62iUYgUivxIkv69yViEuiBIa-Ib9-SkvMeAtA3LFgDzkrxZJjSgSnfckjBJuBkr3qBUYIHBQFLXYp5Nksh8U",
            "auth": "tBHItJI5svbpez7KI4CCXg"
        }
    }"#;

    #[test]
    fn parses_what_the_browser_sends() {
        let s: Subscription = serde_json::from_str(BROWSER_JSON).unwrap();

        assert_eq!(
            s.endpoint.0.as_str(),
            "https://fcm.googleapis.com/fcm/send/dGVzdA:APA91b"
        );
        assert_eq!(s.expiration_time, None);
        assert_eq!(s.keys.auth, "tBHItJI5svbpez7KI4CCXg");
        s.validate().unwrap();
    }

    #[test]
    fn expiration_time_may_be_omitted() {
        let s: Subscription = serde_json::from_str(
            r#"{"endpoint": "https://push.example.com/1", "keys": {"p256dh": "", "auth": ""}}"#,
        )
        .unwrap();

        assert_eq!(s.expiration_time, None);
    }

    #[test]
    fn rejects_relative_endpoints() {
        let r = serde_json::from_str::<Subscription>(
            r#"{"endpoint": "/push", "keys": {"p256dh": "", "auth": ""}}"#,
        );

        assert!(r.is_err());
    }

    #[test]
    fn rejects_short_keys() {
        let mut s: Subscription = serde_json::from_str(BROWSER_JSON).unwrap();
        s.keys.auth = "dGVzdA".into();

        assert!(matches!(
            s.validate(),
            Err(Error::WrongKeyLength {
                name: "auth",
                length: 4
            })
        ));
    }

    #[test]
    fn rejects_garbage_keys() {
        let mut s: Subscription = serde_json::from_str(BROWSER_JSON).unwrap();
        s.keys.p256dh = "not a key".into();

        assert!(matches!(
            s.validate(),
            Err(Error::UndecodableKey { name: "p256dh", .. })
        ));
    }
}
