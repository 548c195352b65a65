use crate::{
    database::DbHandle,
    domain::{Endpoint, Subscription},
};
use serde::Deserialize;
use snafu::{ensure, ResultExt, Snafu};
use tracing::{info, trace};

#[derive(Debug, Clone)]
pub struct BootFlow {
    db: DbHandle,
}

impl BootFlow {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    pub async fn boot(&mut self) -> Result<usize> {
        let Self { db } = self;

        db.initialize().await.context(UnableToInitializeSnafu)?;

        let subscriptions = db
            .subscriptions()
            .await
            .context(UnableToLoadSubscriptionsSnafu)?;
        for s in &subscriptions {
            trace!("Known push endpoint {}", s.endpoint.0);
        }
        info!("{} push subscriptions on record", subscriptions.len());

        Ok(subscriptions.len())
    }
}

#[derive(Debug, Clone)]
pub struct SaveSubscriptionFlow {
    db: DbHandle,
}

impl SaveSubscriptionFlow {
    pub fn new(db: DbHandle) -> Self {
        Self { db }
    }

    /// Stores the subscription exactly as the browser serialized it,
    /// replacing any earlier one for the same endpoint.
    pub async fn save(&mut self, body: &[u8]) -> Result<Endpoint> {
        let Self { db } = self;

        ensure!(!body.is_empty(), NoSubscriptionDataSnafu);
        let raw: serde_json::Value = serde_json::from_slice(body).context(MalformedJsonSnafu)?;
        ensure!(!is_blank(&raw), NoSubscriptionDataSnafu);

        let subscription = Subscription::deserialize(&raw).context(NotASubscriptionSnafu)?;
        subscription.validate().context(InvalidKeysSnafu)?;

        let Subscription { endpoint, .. } = subscription;
        db.save_subscription(endpoint.clone(), raw.to_string())
            .await
            .context(UnableToPersistSubscriptionSnafu)?;

        info!("Saved push subscription for {}", endpoint.0.origin().ascii_serialization());

        Ok(endpoint)
    }
}

/// `null`, `false`, zero and empty containers carry nothing to store.
fn is_blank(value: &serde_json::Value) -> bool {
    use serde_json::Value;

    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("Unable to prepare the database"))]
    UnableToInitialize { source: crate::database::Error },

    #[snafu(display("Unable to load stored subscriptions"))]
    UnableToLoadSubscriptions { source: crate::database::Error },

    #[snafu(display("No subscription data received"))]
    NoSubscriptionData,

    #[snafu(display("The subscription is not valid JSON"))]
    MalformedJson { source: serde_json::Error },

    #[snafu(display("The JSON is not a push subscription"))]
    NotASubscription { source: serde_json::Error },

    #[snafu(display("The subscription keys are invalid"))]
    InvalidKeys { source: crate::domain::Error },

    #[snafu(display("Unable to persist the subscription"))]
    UnableToPersistSubscription { source: crate::database::Error },
}

impl Error {
    /// Whether the caller sent something unusable, as opposed to us
    /// failing to handle it.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::NoSubscriptionData
            | Self::MalformedJson { .. }
            | Self::NotASubscription { .. }
            | Self::InvalidKeys { .. } => true,
            Self::UnableToInitialize { .. }
            | Self::UnableToLoadSubscriptions { .. }
            | Self::UnableToPersistSubscription { .. } => false,
        }
    }
}

type Result<T, E = Error> = std::result::Result<T, E>;
