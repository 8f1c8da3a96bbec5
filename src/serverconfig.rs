//! Server configuration fetch and random server selection (spec §4.F, §6).

use crate::config::ClientOptions;
use crate::error::HttpError;
use crate::http::HttpGet;
use rand::seq::IteratorRandom;
use serde::Deserialize;
use tracing::debug;

/// Fixed binary-dialect port. Unspecified by the wire contract beyond "a
/// fixed binary port" (spec §4.F); invented here as a stand-in constant.
pub const BINARY_PORT: u16 = 8100;

/// Fixed WebSocket path every text-dialect server answers on.
pub const WS_PATH: &str = "/fcsl";

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub chat_servers: Vec<String>,
    pub websocket_servers: std::collections::HashMap<String, String>,
}

/// A resolved dial target: host to connect to, derived from a server
/// config entry and the site's apex domain.
#[derive(Debug, Clone)]
pub struct DialTarget {
    pub host: String,
    pub binary_port: u16,
    pub ws_path: &'static str,
    /// `"wss"` for a real deployment; overridden to `"ws"` by
    /// `ClientOptions::dial_override` in tests that dial a local mock
    /// service with no TLS in front of it.
    pub ws_scheme: &'static str,
}

/// Fetch `https://www.<host>/_js/serverconfig.js?nc=<rand>` and pick a
/// random server for the configured dialect.
pub async fn resolve(
    http: &dyn HttpGet,
    opts: &ClientOptions,
) -> Result<DialTarget, HttpError> {
    let (site_host, _prefix) = opts.site();
    let nc: u32 = rand::random();
    let url = format!("https://www.{site_host}/_js/serverconfig.js?nc={nc}");
    let body = http.get(&url).await?;
    let config: ServerConfig = serde_json::from_str(&body).map_err(|e| {
        debug!(error = %e, "serverconfig.js did not parse as JSON");
        HttpError::Status(0)
    })?;

    let mut rng = rand::thread_rng();
    let server = if opts.use_web_sockets {
        config
            .websocket_servers
            .keys()
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| "0".to_string())
    } else {
        config
            .chat_servers
            .iter()
            .choose(&mut rng)
            .cloned()
            .unwrap_or_else(|| "xchat0".to_string())
    };

    Ok(DialTarget {
        host: format!("{server}.{site_host}"),
        binary_port: BINARY_PORT,
        ws_path: WS_PATH,
        ws_scheme: "wss",
    })
}
