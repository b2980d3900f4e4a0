//! Client configuration

use std::path::PathBuf;

use serde::{Deserialize, Deserializer};
use tracing_subscriber::filter::Directive;

/// Logging output format
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Logging {
    /// Additional filtering directives
    #[serde(default, deserialize_with = "Logging::deserialize_filters")]
    pub filters: Vec<Directive>,

    /// Logging format
    #[serde(default)]
    pub format: LogFormat,
}

impl Logging {
    fn deserialize_filters<'de, D>(deserializer: D) -> Result<Vec<Directive>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let dirs: Vec<String> = Deserialize::deserialize(deserializer)?;
        dirs.into_iter()
            .map(|dir| dir.parse().map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Paths of the remote API endpoints, relative to the base url
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub login: String,
    pub profile: String,
    pub totals: String,
    pub register: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            login: "login/".to_owned(),
            profile: "profile/".to_owned(),
            totals: "totales_usuario/".to_owned(),
            register: "register/".to_owned(),
        }
    }
}

/// Remote API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    /// Base url all endpoints are resolved against
    #[serde(default = "Api::default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds. Requests never time out if not set.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    #[serde(default)]
    pub endpoints: Endpoints,
}

impl Api {
    fn default_base_url() -> String {
        "http://localhost:8000".to_owned()
    }

    /// Configuration pointing to the API at given url, with default endpoints
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: None,
            endpoints: Endpoints::default(),
        }
    }
}

impl Default for Api {
    fn default() -> Self {
        Self::with_base_url(Self::default_base_url())
    }
}

/// Durable storage backend
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Storage {
    /// Storage living as long as the process. Nothing survives a restart.
    Memory {
        #[serde(default = "Storage::default_max_connections")]
        max_connections: u32,
    },

    /// SQLite file based storage
    Sqlite {
        path: PathBuf,
        #[serde(default = "Storage::default_max_connections")]
        max_connections: u32,
        /// Runs the storage migrations on startup
        #[serde(default = "Storage::default_migrate")]
        migrate: bool,
    },
}

impl Storage {
    fn default_max_connections() -> u32 {
        1
    }

    fn default_migrate() -> bool {
        true
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::Memory {
            max_connections: Self::default_max_connections(),
        }
    }
}

/// Session behaviour
#[derive(Debug, Clone, Deserialize)]
pub struct Session {
    /// Avatar service used when the profile comes without an avatar
    #[serde(default = "Session::default_avatar_base_url")]
    pub avatar_base_url: String,

    /// Refetches the totals every time a credential is set
    #[serde(default = "Session::default_refresh_totals")]
    pub refresh_totals: bool,
}

impl Session {
    fn default_avatar_base_url() -> String {
        "https://api.dicebear.com/9.x/shapes/svg".to_owned()
    }

    fn default_refresh_totals() -> bool {
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self {
            avatar_base_url: Self::default_avatar_base_url(),
            refresh_totals: Self::default_refresh_totals(),
        }
    }
}

/// Top level client configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Remote API configuration
    #[serde(default)]
    pub api: Api,

    /// Durable storage configuration
    #[serde(default)]
    pub storage: Storage,

    /// Session configuration
    #[serde(default)]
    pub session: Session,

    /// Path to the catalog file. The catalog is empty if not given.
    #[serde(default)]
    pub catalog: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: Logging,
}
