//! Binance adapter configuration.

use std::fmt;
use std::time::Duration;

use crate::resilience::RetryPolicy;

/// Environment for the futures API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinanceEnvironment {
    /// Futures testnet.
    Testnet,
    /// Production.
    Mainnet,
}

impl BinanceEnvironment {
    /// Base URL for the REST API.
    #[must_use]
    pub const fn base_url(&self) -> &'static str {
        match self {
            Self::Testnet => "https://testnet.binancefuture.com",
            Self::Mainnet => "https://fapi.binance.com",
        }
    }

    /// Check if this is real-money trading.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Mainnet)
    }
}

impl fmt::Display for BinanceEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Testnet => write!(f, "TESTNET"),
            Self::Mainnet => write!(f, "MAINNET"),
        }
    }
}

/// API key and secret. The secret never appears in `Debug` output.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
    api_secret: String,
}

impl Credentials {
    /// Create credentials.
    #[must_use]
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// API key sent in `X-MBX-APIKEY`.
    #[must_use]
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub(crate) fn api_secret(&self) -> &str {
        &self.api_secret
    }

    /// Whether both parts are present.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key_hint = self.api_key.get(..4).unwrap_or("");
        f.debug_struct("Credentials")
            .field("api_key", &format_args!("{key_hint}***"))
            .field("api_secret", &"***")
            .finish()
    }
}

/// Configuration for the Binance futures adapter.
#[derive(Debug, Clone)]
pub struct BinanceConfig {
    /// Credentials; public endpoints work without them.
    pub credentials: Option<Credentials>,
    /// Environment.
    pub environment: BinanceEnvironment,
    /// Base URL override (tests, proxies).
    pub base_url: Option<String>,
    /// Timeout for signed calls.
    pub signed_timeout: Duration,
    /// Timeout for public calls.
    pub public_timeout: Duration,
    /// `recvWindow` in milliseconds.
    pub recv_window_ms: u64,
    /// Retry policy for one logical call.
    pub retry: RetryPolicy,
    /// Longest wait for an admission slot.
    pub admission_wait_ceiling: Duration,
}

impl BinanceConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new(credentials: Option<Credentials>, environment: BinanceEnvironment) -> Self {
        Self {
            credentials,
            environment,
            base_url: None,
            signed_timeout: Duration::from_secs(15),
            public_timeout: Duration::from_secs(10),
            recv_window_ms: 10_000,
            retry: RetryPolicy::default(),
            admission_wait_ceiling: Duration::from_secs(30),
        }
    }

    /// Point the adapter at another host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Set the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the admission wait ceiling.
    #[must_use]
    pub const fn with_admission_wait_ceiling(mut self, ceiling: Duration) -> Self {
        self.admission_wait_ceiling = ceiling;
        self
    }

    /// Effective base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.environment.base_url())
            .trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_urls() {
        let config = BinanceConfig::new(None, BinanceEnvironment::Mainnet);
        assert_eq!(config.base_url(), "https://fapi.binance.com");
        let config = config.with_base_url("http://127.0.0.1:9000/");
        assert_eq!(config.base_url(), "http://127.0.0.1:9000");
        assert_eq!(
            BinanceEnvironment::Testnet.base_url(),
            "https://testnet.binancefuture.com"
        );
    }

    #[test]
    fn debug_redacts_secret() {
        let creds = Credentials::new("abcdefgh", "super-secret");
        let debug = format!("{creds:?}");
        assert!(debug.contains("abcd***"));
        assert!(!debug.contains("super-secret"));
        assert!(!debug.contains("efgh"));
    }

    #[test]
    fn defaults_match_exchange_limits() {
        let config = BinanceConfig::new(None, BinanceEnvironment::Testnet);
        assert_eq!(config.recv_window_ms, 10_000);
        assert_eq!(config.signed_timeout, Duration::from_secs(15));
        assert_eq!(config.public_timeout, Duration::from_secs(10));
        assert!(!BinanceEnvironment::Testnet.is_live());
    }
}
