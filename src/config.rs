//! Client configuration (spec §6, `ClientOptions`).

use crate::serverconfig::DialTarget;
use std::time::Duration;

/// Options governing dialect selection, site, and timeout thresholds.
///
/// Mirrors the recognized `ClientOptions` table in spec §6; every default
/// matches the table verbatim.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Select the text/WebSocket dialect over the binary dialect.
    pub use_web_sockets: bool,
    /// Use the alternate site's host and username prefix.
    pub cam_you: bool,
    /// Skip the server-config fetch and reuse a cached value.
    pub use_cached_server_config: bool,
    /// Any-packet silence threshold before the watchdog force-closes.
    pub silence_timeout: Duration,
    /// State-class-packet silence threshold, enforced only once logged in.
    pub state_silence_timeout: Duration,
    /// Deadline for a LOGIN response after the handshake is sent.
    pub login_timeout: Duration,
    /// Deadline for the initial `Connect` to reach `Active`. Unset by
    /// default (the caller may wait indefinitely).
    pub connection_timeout: Option<Duration>,
    /// Bypass `serverconfig::resolve` entirely and dial this target instead.
    /// Not part of the spec's `ClientOptions` table — it exists so
    /// `fc-test-support`-driven integration tests can point the connection
    /// manager at a local mock service without a real server-config fetch
    /// or DNS lookup standing in the way.
    pub dial_override: Option<DialTarget>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            use_web_sockets: true,
            cam_you: false,
            use_cached_server_config: false,
            silence_timeout: Duration::from_millis(90_000),
            state_silence_timeout: Duration::from_millis(120_000),
            login_timeout: Duration::from_millis(30_000),
            connection_timeout: None,
            dial_override: None,
        }
    }
}

impl ClientOptions {
    /// The watchdog tick period for the selected dialect (spec §4.F):
    /// 15 s for WebSocket, 120 s for the binary dialect.
    pub fn watchdog_tick(&self) -> Duration {
        if self.use_web_sockets {
            Duration::from_secs(15)
        } else {
            Duration::from_secs(120)
        }
    }

    /// The site host to dial, and the username prefix to use in the LOGIN
    /// payload (spec §6, "Login payload"). The wire contract only ever
    /// refers to `<host>`; the two concrete hosts here are placeholders for
    /// whichever primary/alternate site config the embedding application
    /// supplies, not a hardcoded external identity.
    pub fn site(&self) -> (&'static str, &'static str) {
        if self.cam_you {
            ("alt-example-chat-service.test", "2/")
        } else {
            ("example-chat-service.test", "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let opts = ClientOptions::default();
        assert!(opts.use_web_sockets);
        assert!(!opts.cam_you);
        assert!(!opts.use_cached_server_config);
        assert_eq!(opts.silence_timeout, Duration::from_secs(90));
        assert_eq!(opts.state_silence_timeout, Duration::from_secs(120));
        assert_eq!(opts.login_timeout, Duration::from_secs(30));
        assert!(opts.connection_timeout.is_none());
    }

    #[test]
    fn watchdog_tick_depends_on_dialect() {
        let mut opts = ClientOptions::default();
        assert_eq!(opts.watchdog_tick(), Duration::from_secs(15));
        opts.use_web_sockets = false;
        assert_eq!(opts.watchdog_tick(), Duration::from_secs(120));
    }
}
