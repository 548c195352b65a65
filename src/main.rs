#![deny(rust_2018_idioms)]

use diesel::{prelude::*, sqlite::SqliteConnection};
use snafu::{ResultExt, Snafu};
use std::error::Error as _;
use tracing::{error, info};

pub use config::Config;

mod config;
mod database;
mod domain;
mod flow;
mod web_ui;

type GlobalConfig = &'static Config;

fn main() {
    if let Err(e) = core() {
        eprintln!("Error: {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            eprintln!("Caused by: {}", cause);
            source = cause.source();
        }
        std::process::exit(1);
    }
}

#[tokio::main]
async fn core() -> Result<()> {
    tracing_subscriber::fmt::init();
    dotenv::dotenv().ok();

    info!("push-relay {}", env!("VERGEN_GIT_SHA"));

    let config = Config::from_environment().context(UnableToConfigureSnafu)?;
    let config = &*Box::leak(Box::new(config));

    if config.vapid_public_key.is_none() {
        error!("VAPID_PUBLIC_KEY is not set; browsers will not be able to subscribe");
    }

    let database_url = &config.database_url;
    let conn =
        SqliteConnection::establish(database_url).context(UnableToConnectSnafu { database_url })?;

    let (db, db_task) = database::spawn(database::Db::new(conn));

    let mut boot_flow = flow::BootFlow::new(db.clone());
    boot_flow.boot().await.context(UnableToBootSnafu)?;

    let save_flow = flow::SaveSubscriptionFlow::new(db);

    let web_ui = tokio::spawn(web_ui::serve(config, save_flow));

    tokio::select! {
        web_ui = web_ui => {
            web_ui.context(WebUiFailedSnafu)
        }
        db_task = db_task => {
            db_task.context(DatabaseFailedSnafu)?;
            DatabaseExitedSnafu.fail()
        }
    }
}

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("Unable to configure application"))]
    UnableToConfigure { source: config::Error },

    #[snafu(display("Error connecting to {}", database_url))]
    UnableToConnect {
        source: diesel::ConnectionError,
        database_url: String,
    },

    #[snafu(display("Unable to load stored subscriptions"))]
    UnableToBoot { source: flow::Error },

    #[snafu(display("The web UI failed"))]
    WebUiFailed { source: tokio::task::JoinError },

    #[snafu(display("The database exited and never should"))]
    DatabaseExited,

    #[snafu(display("The database failed and never should"))]
    DatabaseFailed { source: tokio::task::JoinError },
}

type Result<T, E = Error> = std::result::Result<T, E>;
