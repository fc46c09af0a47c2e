use serde::Deserialize;
use tracing::warn;

/// Default base identifier for pub/sub notification routing. Kept for
/// compatibility with deployments that predate this crate.
pub const DEFAULT_ADDRESS: &str = "io.vertx.mod-redis";

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// TCP host of the server.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Text encoding used when decoding bulk replies to strings. Only UTF-8
    /// is supported; anything else falls back to UTF-8 with a warning.
    pub encoding: String,
    /// Reserved. Deprecated: setting it logs a warning and changes nothing.
    pub binary: bool,
    /// Base identifier for pub/sub notification routing: messages for
    /// channel `ch` are published to `"{address}.ch"`.
    pub address: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            host: "localhost".to_string(),
            port: 6379,
            encoding: "UTF-8".to_string(),
            binary: false,
            address: DEFAULT_ADDRESS.to_string(),
        }
    }
}

impl Config {
    /// Warn about config keys that are accepted but have no effect.
    pub(crate) fn warn_unsupported(&self) {
        if self.binary {
            warn!("binary mode is deprecated and not implemented; ignoring");
        }
        if !is_utf8(&self.encoding) {
            warn!(
                encoding = %self.encoding,
                "unsupported encoding, falling back to UTF-8"
            );
        }
    }
}

fn is_utf8(encoding: &str) -> bool {
    encoding.eq_ignore_ascii_case("utf-8") || encoding.eq_ignore_ascii_case("utf8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 6379);
        assert_eq!(config.encoding, "UTF-8");
        assert!(!config.binary);
        assert_eq!(config.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn deserialize_partial() {
        let config: Config =
            serde_json::from_str(r#"{"host": "redis.internal", "port": 6380}"#).unwrap();
        assert_eq!(config.host, "redis.internal");
        assert_eq!(config.port, 6380);
        assert_eq!(config.address, DEFAULT_ADDRESS);
    }

    #[test]
    fn encoding_detection() {
        assert!(is_utf8("UTF-8"));
        assert!(is_utf8("utf8"));
        assert!(!is_utf8("iso-8859-1"));
    }
}
