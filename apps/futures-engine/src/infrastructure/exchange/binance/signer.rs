//! Request signing.
//!
//! Pure: given parameters, a timestamp and credentials, produce the exact
//! query string to send. The executor calls it once per attempt so every
//! retry carries a fresh timestamp.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::config::Credentials;
use super::error::BinanceError;
use super::params::RequestParams;

type HmacSha256 = Hmac<Sha256>;

/// A signed (or public) query ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedQuery {
    /// Query string, including `signature` last when signed.
    pub query: String,
    /// Value for the `X-MBX-APIKEY` header.
    pub api_key: Option<String>,
}

/// Signs requests with HMAC-SHA256.
#[derive(Debug, Clone)]
pub struct RequestSigner {
    credentials: Option<Credentials>,
    recv_window_ms: u64,
}

impl RequestSigner {
    /// Create a signer.
    #[must_use]
    pub const fn new(credentials: Option<Credentials>, recv_window_ms: u64) -> Self {
        Self {
            credentials,
            recv_window_ms,
        }
    }

    /// Whether signed calls are possible.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.credentials.as_ref().is_some_and(Credentials::is_complete)
    }

    /// Build the query for one attempt.
    ///
    /// Signed queries get `recvWindow` and `timestamp` appended to the
    /// canonical parameters, then `signature` over all of it.
    pub fn prepare(
        &self,
        params: &RequestParams,
        signed: bool,
        with_api_key: bool,
        timestamp_ms: i64,
    ) -> Result<SignedQuery, BinanceError> {
        let api_key = if with_api_key || signed {
            let creds = self
                .credentials
                .as_ref()
                .filter(|c| c.is_complete())
                .ok_or(BinanceError::MissingCredentials)?;
            Some(creds.api_key().to_string())
        } else {
            None
        };

        if !signed {
            return Ok(SignedQuery {
                query: canonical_query(params),
                api_key,
            });
        }

        let mut params = params.clone();
        params.insert("recvWindow", self.recv_window_ms);
        params.insert("timestamp", timestamp_ms);
        let payload = canonical_query(&params);

        let secret = self
            .credentials
            .as_ref()
            .map(Credentials::api_secret)
            .ok_or(BinanceError::MissingCredentials)?;
        let signature = sign(secret, &payload)?;

        Ok(SignedQuery {
            query: format!("{payload}&signature={signature}"),
            api_key,
        })
    }
}

/// Parameters sorted by key and form-encoded.
#[must_use]
pub fn canonical_query(params: &RequestParams) -> String {
    let mut pairs: Vec<(&str, &str)> = params.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(k, v)| format!("{}={}", encode(k), encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Hex HMAC-SHA256 of `payload`.
pub fn sign(secret: &str, payload: &str) -> Result<String, BinanceError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| BinanceError::InvalidRequest(format!("invalid HMAC key: {e}")))?;
    mac.update(payload.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Vector from the exchange API documentation.
    const DOC_SECRET: &str = "NhqPtmdSJYdKjVHjA7PZj4Mge3R5YNiP1e3UZjInClVN65XAbvqqM6A7H5fATj0j";
    const DOC_PAYLOAD: &str = "symbol=LTCBTC&side=BUY&type=LIMIT&timeInForce=GTC&quantity=1&price=0.1&recvWindow=5000&timestamp=1499827319559";
    const DOC_SIGNATURE: &str = "c8db56825ae71d6d79447849e617115f4a920fa2acdcab2b053c4b2838bd6b71";

    fn signer() -> RequestSigner {
        RequestSigner::new(Some(Credentials::new("key", DOC_SECRET)), 10_000)
    }

    #[test]
    fn hmac_matches_documented_vector() {
        assert_eq!(sign(DOC_SECRET, DOC_PAYLOAD).unwrap(), DOC_SIGNATURE);
    }

    #[test]
    fn canonical_query_sorts_and_encodes() {
        let params = RequestParams::new()
            .with("symbol", "BTCUSDT")
            .with("newClientOrderId", "SCA-16OCT-00001-E")
            .with("note", "a b&c");
        assert_eq!(
            canonical_query(&params),
            "newClientOrderId=SCA-16OCT-00001-E&note=a+b%26c&symbol=BTCUSDT"
        );
    }

    #[test]
    fn signed_query_appends_window_timestamp_and_signature() {
        let params = RequestParams::new().with("symbol", "BTCUSDT");
        let prepared = signer().prepare(&params, true, true, 1_700_000_000_000).unwrap();

        let (payload, signature) = prepared.query.rsplit_once("&signature=").unwrap();
        assert_eq!(
            payload,
            "recvWindow=10000&symbol=BTCUSDT&timestamp=1700000000000"
        );
        assert_eq!(signature, sign(DOC_SECRET, payload).unwrap());
        assert_eq!(prepared.api_key.as_deref(), Some("key"));
    }

    #[test]
    fn each_timestamp_yields_a_new_signature() {
        let params = RequestParams::new().with("symbol", "BTCUSDT");
        let a = signer().prepare(&params, true, true, 1).unwrap();
        let b = signer().prepare(&params, true, true, 2).unwrap();
        assert_ne!(a.query, b.query);
    }

    #[test]
    fn public_query_is_unsigned() {
        let params = RequestParams::new().with("symbol", "BTCUSDT");
        let prepared = RequestSigner::new(None, 10_000)
            .prepare(&params, false, false, 1)
            .unwrap();
        assert_eq!(prepared.query, "symbol=BTCUSDT");
        assert!(prepared.api_key.is_none());
    }

    #[test]
    fn signed_without_credentials_fails() {
        let err = RequestSigner::new(None, 10_000)
            .prepare(&RequestParams::new(), true, true, 1)
            .unwrap_err();
        assert!(matches!(err, BinanceError::MissingCredentials));
    }
}
