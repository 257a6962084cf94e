use std::net::SocketAddr;

use crate::butterfly::feed::DEFAULT_PAGE_SIZE;

#[derive(Clone, Debug, PartialEq)]
pub enum Env {
    Dev,
    Staging,
    Production,
}

#[derive(Clone, Debug)]
pub enum StoreConfig {
    Mongo {
        uri: String,
        database: String,
        transactions: bool,
    },
    /// Nothing survives a restart
    Memory,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub env: Env,
    pub listen_addr: SocketAddr,
    pub store: StoreConfig,
    pub cors_origins: Vec<String>,
    pub feed_page_size: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            env: Env::Dev,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            store: StoreConfig::Memory,
            cors_origins: vec![],
            feed_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn var(key: &str) -> Result<Option<String>, String> {
    match std::env::var(key) {
        Ok(env) => Ok(Some(env)),
        Err(e) => match e {
            std::env::VarError::NotPresent => {
                tracing::debug!("Missing environment variable `{key}`");
                Ok(None)
            }
            std::env::VarError::NotUnicode(_) => Err(format!(
                "Could not get the environment variable `{key}` due to unicode error"
            )),
        },
    }
}

fn required_var(key: &str) -> String {
    let val = var(key);
    match val {
        Ok(val) => match val {
            Some(val) => val,
            None => {
                tracing::error!("Environment variable `{key}` is required");
                std::process::exit(1)
            }
        },
        Err(e) => {
            tracing::error!(
                "Environment variable `{key}` is required, but could not retrieve: {e}"
            );
            std::process::exit(1)
        }
    }
}

/// Parses an optional variable, falling back to `default` when it is unset
/// or malformed.
fn parsed_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    match var(key) {
        Ok(Some(val)) => match val.trim().parse() {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::warn!("Could not parse environment variable `{key}`, using the default");
                default
            }
        },
        _ => default,
    }
}

impl ServerConfig {
    pub fn new_from_env() -> Self {
        let defaults = ServerConfig::default();

        let store = match var("STORE_BACKEND") {
            Ok(Some(backend)) if backend == "memory" => StoreConfig::Memory,
            _ => StoreConfig::Mongo {
                uri: required_var("MONGODB_URI"),
                database: var("MONGODB_DATABASE")
                    .ok()
                    .flatten()
                    .unwrap_or_else(|| "butterflies".into()),
                transactions: parsed_var("MONGODB_TRANSACTIONS", true),
            },
        };

        let cors_origins = match var("CORS_ORIGINS") {
            Ok(Some(origins)) => origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect(),
            _ => vec![],
        };

        ServerConfig {
            env: match var("ENVIRONMENT") {
                Ok(Some(env)) => match env.as_str() {
                    "dev" => Env::Dev,
                    "staging" => Env::Staging,
                    "production" => Env::Production,
                    _ => Env::Dev,
                },
                _ => Env::Dev,
            },
            listen_addr: parsed_var("LISTEN_ADDR", defaults.listen_addr),
            store,
            cors_origins,
            feed_page_size: parsed_var("FEED_PAGE_SIZE", defaults.feed_page_size),
        }
    }
}
