//! Deployment settings read from the environment.

use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";
const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_SOURCE_NAME: &str = "health_connect";

/// How the server obtains backend access tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// Exchange a refresh token with Supabase auth.
    RefreshToken {
        refresh_token: String,
        user_id: Option<String>,
    },
    /// Use a fixed access token.
    AccessToken {
        access_token: String,
        user_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub listen_addr: SocketAddr,
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub auth: AuthConfig,
    pub health_bridge_url: String,
    pub health_source_name: String,
}

fn url_value(value: String) -> String {
    value.trim().trim_end_matches('/').to_string()
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).with_context(|| format!("{} is not set", key));

        let listen_addr = get("MM_LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .context("MM_LISTEN_ADDR is not a valid socket address")?;

        let auth = match (
            get("SUPABASE_REFRESH_TOKEN"),
            get("SUPABASE_ACCESS_TOKEN"),
            get("SUPABASE_USER_ID"),
        ) {
            (Some(refresh_token), _, user_id) => AuthConfig::RefreshToken {
                refresh_token,
                user_id,
            },
            (None, Some(access_token), Some(user_id)) => AuthConfig::AccessToken {
                access_token,
                user_id,
            },
            (None, Some(_), None) => {
                bail!("SUPABASE_USER_ID is required with SUPABASE_ACCESS_TOKEN")
            }
            (None, None, _) => {
                bail!("Set SUPABASE_REFRESH_TOKEN or SUPABASE_ACCESS_TOKEN")
            }
        };

        Ok(Self {
            data_dir: PathBuf::from(
                get("MM_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string()),
            ),
            listen_addr,
            supabase_url: url_value(require("SUPABASE_URL")?),
            supabase_anon_key: require("SUPABASE_ANON_KEY")?,
            auth,
            health_bridge_url: url_value(require("HEALTH_BRIDGE_URL")?),
            health_source_name: get("HEALTH_SOURCE_NAME")
                .unwrap_or_else(|| DEFAULT_SOURCE_NAME.to_string()),
        })
    }
}
