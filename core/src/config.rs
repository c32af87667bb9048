//! Instrumentation Configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::headers::CorrelationHeaders;

fn default_reply_timeout_ms() -> u64 {
    30_000
}

/// Tunables shared by every decorator created from one factory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentationConfig {
    /// How long a duplex two-way send waits for its reply before the pending
    /// span is finalized as "no reply".
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: u64,
    /// Correlation header names injected on instrumented sends.
    #[serde(default)]
    pub headers: CorrelationHeaders,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: default_reply_timeout_ms(),
            headers: CorrelationHeaders::default(),
        }
    }
}

impl InstrumentationConfig {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.reply_timeout_ms)
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Load from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InstrumentationConfig::default();
        assert_eq!(config.reply_timeout(), Duration::from_secs(30));
        assert_eq!(config.headers.namespace, "wiretap");
    }

    #[test]
    fn test_from_toml() {
        let config = InstrumentationConfig::from_toml_str(
            r#"
            reply_timeout_ms = 250

            [headers]
            root_header = "x-op-root"
            parent_header = "x-op-parent"
            namespace = "acme"
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.reply_timeout(), Duration::from_millis(250));
        assert_eq!(config.headers.root_header, "x-op-root");
        assert_eq!(config.headers.namespace, "acme");
    }

    #[test]
    fn test_missing_fields_fall_back() {
        let config = InstrumentationConfig::from_toml_str("").expect("empty toml");
        assert_eq!(config.reply_timeout_ms, 30_000);
    }
}
