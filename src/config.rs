use snafu::{ResultExt, Snafu};
use std::{
    env::{self, VarError},
    net::{IpAddr, SocketAddr},
    path::PathBuf,
};

const DEFAULT_ASSET_DIRECTORY: &str = "push-client/pkg";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub listen_address: SocketAddr,
    pub vapid_public_key: Option<String>,
    pub asset_directory: PathBuf,
}

impl Config {
    pub fn from_environment() -> Result<Self> {
        Self::from_vars(|name| env::var(name))
    }

    fn from_vars(var: impl Fn(&str) -> Result<String, VarError>) -> Result<Self> {
        let database_url = var("DATABASE_URL").context(UnknownDatabaseUrlSnafu)?;
        let address = var("WEB_LISTEN_ADDRESS").context(UnknownWebListenAddressSnafu)?;
        let port = var("WEB_LISTEN_PORT").or_else(|_| var("PORT"));
        let port = port.context(UnknownWebListenPortSnafu)?;

        let address: IpAddr = address
            .parse()
            .context(InvalidWebListenAddressSnafu { address })?;
        let port = port.parse().context(InvalidWebListenPortSnafu { port })?;
        let listen_address = (address, port).into();

        let vapid_public_key = optional(var("VAPID_PUBLIC_KEY"))?;
        if let Some(key) = &vapid_public_key {
            push_client::key::decode_vapid_public_key(key)
                .context(InvalidVapidPublicKeySnafu { key })?;
        }

        let asset_directory = optional(var("ASSET_DIRECTORY"))?
            .unwrap_or_else(|| DEFAULT_ASSET_DIRECTORY.into())
            .into();

        Ok(Self {
            database_url,
            listen_address,
            vapid_public_key,
            asset_directory,
        })
    }
}

fn optional(value: Result<String, VarError>) -> Result<Option<String>> {
    match value {
        Ok(v) if v.is_empty() => Ok(None),
        Ok(v) => Ok(Some(v)),
        Err(VarError::NotPresent) => Ok(None),
        Err(e) => Err(e).context(UnreadableVariableSnafu),
    }
}

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("DATABASE_URL must be set"))]
    UnknownDatabaseUrl { source: VarError },

    #[snafu(display("WEB_LISTEN_ADDRESS must be set"))]
    UnknownWebListenAddress { source: VarError },

    #[snafu(display("WEB_LISTEN_ADDRESS is invalid"))]
    InvalidWebListenAddress {
        source: std::net::AddrParseError,
        address: String,
    },

    #[snafu(display("WEB_LISTEN_PORT must be set"))]
    UnknownWebListenPort { source: VarError },

    #[snafu(display("WEB_LISTEN_PORT is invalid"))]
    InvalidWebListenPort {
        source: std::num::ParseIntError,
        port: String,
    },

    #[snafu(display("VAPID_PUBLIC_KEY is invalid"))]
    InvalidVapidPublicKey {
        source: push_client::key::Error,
        key: String,
    },

    #[snafu(display("An optional variable is not valid unicode"))]
    UnreadableVariable { source: VarError },
}

type Result<T, E = Error> = std::result::Result<T, E>;
