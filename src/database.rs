use crate::domain::{Endpoint, StoredSubscription};
use diesel::{prelude::*, sqlite::SqliteConnection};
use futures::{
    channel::{mpsc, oneshot},
    SinkExt, StreamExt,
};
use snafu::{ResultExt, Snafu};
use tracing::{trace, trace_span};
use url::Url;

mod models;
mod schema;

const CREATE_PUSH_SUBSCRIPTIONS: &str = "
    CREATE TABLE IF NOT EXISTS push_subscriptions (
        endpoint TEXT PRIMARY KEY NOT NULL,
        subscription_json TEXT NOT NULL
    )
";

pub struct Db {
    conn: SqliteConnection,
}

impl Db {
    pub fn new(conn: SqliteConnection) -> Self {
        Self { conn }
    }
}

impl Db {
    fn initialize(&mut self) -> Result<()> {
        let Self { conn } = self;

        diesel::sql_query(CREATE_PUSH_SUBSCRIPTIONS)
            .execute(conn)
            .context(UnableToCreateSchemaSnafu)?;

        Ok(())
    }

    fn save_subscription(&mut self, endpoint: Endpoint, json: String) -> Result<()> {
        use models::PushSubscription;
        use schema::push_subscriptions::dsl;

        let s = trace_span!("save_subscription", endpoint = %endpoint.0);
        let _s = s.enter();
        let Self { conn } = self;

        let subscription = PushSubscription {
            endpoint: endpoint.0.into(),
            subscription_json: json,
        };

        // A browser re-subscribing keeps its endpoint; the newest keys win
        diesel::replace_into(dsl::push_subscriptions)
            .values(&subscription)
            .execute(conn)
            .context(UnableToSaveSubscriptionSnafu)?;

        trace!("Saved subscription");

        Ok(())
    }

    fn subscriptions(&mut self) -> Result<Vec<StoredSubscription>> {
        use models::PushSubscription;
        use schema::push_subscriptions::dsl;

        let Self { conn } = self;

        let rows = dsl::push_subscriptions
            .order(dsl::endpoint)
            .load::<PushSubscription>(conn)
            .context(UnableToQuerySubscriptionsSnafu)?;

        rows.into_iter()
            .map(|row| -> Result<_> {
                let PushSubscription {
                    endpoint,
                    subscription_json,
                } = row;
                let url = Url::parse(&endpoint).context(CorruptEndpointSnafu { endpoint })?;
                Ok(StoredSubscription {
                    endpoint: Endpoint(url),
                    json: subscription_json,
                })
            })
            .collect()
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    UnableToCreateSchema { source: diesel::result::Error },

    UnableToSaveSubscription { source: diesel::result::Error },

    UnableToQuerySubscriptions { source: diesel::result::Error },

    #[snafu(display("The stored endpoint {} is not a URL", endpoint))]
    CorruptEndpoint {
        source: url::ParseError,
        endpoint: String,
    },

    #[snafu(display("The database task is gone"))]
    ActorGone { source: oneshot::Canceled },
}

type Result<T, E = Error> = std::result::Result<T, E>;

// https://draft.ryhl.io/blog/actors-with-tokio/

pub fn spawn(this: Db) -> (DbHandle, tokio::task::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(10);
    let child = tokio::spawn(db_task(this, rx));
    (DbHandle(tx), child)
}

#[derive(Debug, Clone)]
pub struct DbHandle(mpsc::Sender<DbCommand>);

impl DbHandle {
    pub async fn initialize(&mut self) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        // Ignore send errors. If this send fails, so does the
        // rx.await below. There's no reason to check for the
        // same failure twice.
        let _ = self.0.send(DbCommand::Initialize(tx)).await;
        rx.await.context(ActorGoneSnafu)?
    }

    pub async fn save_subscription(&mut self, a: Endpoint, b: String) -> Result<()> {
        let (tx, rx) = oneshot::channel();

        let _ = self.0.send(DbCommand::SaveSubscription(tx, a, b)).await;
        rx.await.context(ActorGoneSnafu)?
    }

    pub async fn subscriptions(&mut self) -> Result<Vec<StoredSubscription>> {
        let (tx, rx) = oneshot::channel();

        let _ = self.0.send(DbCommand::Subscriptions(tx)).await;
        rx.await.context(ActorGoneSnafu)?
    }
}

#[derive(Debug)]
enum DbCommand {
    Initialize(oneshot::Sender<Result<()>>),

    SaveSubscription(oneshot::Sender<Result<()>>, Endpoint, String),

    Subscriptions(oneshot::Sender<Result<Vec<StoredSubscription>>>),
}

async fn db_task(mut this: Db, mut rx: mpsc::Receiver<DbCommand>) {
    while let Some(cmd) = rx.next().await {
        // Diesel is synchronous; requires the multi-threaded runtime
        match cmd {
            DbCommand::Initialize(__r) => {
                let retval = tokio::task::block_in_place(|| this.initialize());

                // If we couldn't respond, that's OK
                let _ = __r.send(retval);
            }

            DbCommand::SaveSubscription(__r, a, b) => {
                let retval = tokio::task::block_in_place(|| this.save_subscription(a, b));
                let _ = __r.send(retval);
            }

            DbCommand::Subscriptions(__r) => {
                let retval = tokio::task::block_in_place(|| this.subscriptions());
                let _ = __r.send(retval);
            }
        }
    }
}
