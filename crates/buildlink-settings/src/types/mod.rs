//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a
//! settings file only needs the fields it changes.

use serde::{Deserialize, Serialize};

/// Root settings type for a buildlink client.
///
/// ```json
/// {
///   "connection": { "address": "127.0.0.1:5010" },
///   "client": { "humanReadableName": "my-ide", "requestTimeoutMs": 30000 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientSettings {
    /// How to reach the server.
    pub connection: ConnectionSettings,
    /// How this client identifies itself and waits for replies.
    pub client: IdentitySettings,
    /// Local diagnostics.
    pub logging: LoggingSettings,
}

/// Server address and dial behaviour.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// `host:port` of the server's line protocol listener.
    pub address: String,
    /// Give up dialing after this many milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5010".to_string(),
            connect_timeout_ms: 5_000,
        }
    }
}

/// Client identity announced at registration, plus request policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentitySettings {
    /// Short configuration name, e.g. `ide` or `console`.
    pub config_name: String,
    /// Name shown in server logs.
    pub human_readable_name: String,
    /// Fail pending requests after this many milliseconds. `None` waits
    /// until the reply arrives or the connection closes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_ms: Option<u64>,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            config_name: "buildlink".to_string(),
            human_readable_name: "buildlink client".to_string(),
            request_timeout_ms: None,
        }
    }
}

/// Local log output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `warn` or
    /// `buildlink_client=debug`.
    pub level: String,
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}
