//! Signed request executor.
//!
//! One logical call runs up to `max_attempts` HTTP attempts. Every attempt
//! re-consults admission, takes a fresh timestamp and re-signs. Bookkeeping
//! against the admission controller happens once per call: the first
//! rate-limit response opens the circuit (later ones only extend the ban),
//! and a call that ends any other way after reaching the exchange settles
//! with `record_request`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::api_types::BinanceErrorResponse;
use super::config::BinanceConfig;
use super::endpoints::Endpoint;
use super::error::BinanceError;
use super::error_codes::{ErrorClass, classify};
use super::params::RequestParams;
use super::signer::RequestSigner;
use crate::observability::metrics;
use crate::resilience::{
    AdmissionController, HeaderSnapshot, RequestPriority, RetryPolicy, parse_ban_until,
    parse_retry_after,
};

const USED_WEIGHT_HEADER: &str = "x-mbx-used-weight-1m";
const ORDER_COUNT_HEADER: &str = "x-mbx-order-count-1m";
const API_KEY_HEADER: &str = "X-MBX-APIKEY";

/// Executes REST calls under admission control with retries.
#[derive(Debug, Clone)]
pub struct SignedRequestExecutor {
    signed_client: Client,
    public_client: Client,
    base_url: String,
    signer: RequestSigner,
    admission: Arc<AdmissionController>,
    retry: RetryPolicy,
    wait_ceiling: Duration,
}

/// How one attempt ended when it did not succeed.
enum AttemptFailure {
    /// Worth another attempt.
    Retry {
        error: BinanceError,
        hint: Option<Duration>,
    },
    /// Rate limit or ban; `server_until` is the unban time the exchange gave.
    RateLimited {
        server_until: Option<DateTime<Utc>>,
        message: String,
    },
    /// Return now.
    Terminal(BinanceError),
}

impl SignedRequestExecutor {
    /// Create an executor sharing `admission` with every other caller.
    pub fn new(
        config: &BinanceConfig,
        admission: Arc<AdmissionController>,
    ) -> Result<Self, BinanceError> {
        let signed_client = Client::builder()
            .timeout(config.signed_timeout)
            .build()
            .map_err(|e| BinanceError::Network(e.to_string()))?;
        let public_client = Client::builder()
            .timeout(config.public_timeout)
            .build()
            .map_err(|e| BinanceError::Network(e.to_string()))?;

        Ok(Self {
            signed_client,
            public_client,
            base_url: config.base_url().to_string(),
            signer: RequestSigner::new(config.credentials.clone(), config.recv_window_ms),
            admission,
            retry: config.retry.clone(),
            wait_ceiling: config.admission_wait_ceiling,
        })
    }

    /// Shared admission controller.
    #[must_use]
    pub const fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    /// Whether signed endpoints can be called.
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        self.signer.has_credentials()
    }

    /// Execute at the endpoint's default priority and return the raw body.
    pub async fn execute(
        &self,
        method: Method,
        endpoint: Endpoint,
        params: &RequestParams,
    ) -> Result<String, BinanceError> {
        let priority = endpoint.default_priority(&method);
        self.execute_with_priority(method, endpoint, params, priority)
            .await
    }

    /// Execute on the critical path: admitted through an open circuit, never
    /// past the weight budget.
    pub async fn execute_critical(
        &self,
        method: Method,
        endpoint: Endpoint,
        params: &RequestParams,
    ) -> Result<String, BinanceError> {
        self.execute_with_priority(method, endpoint, params, RequestPriority::Critical)
            .await
    }

    /// Execute and decode the JSON body.
    pub async fn execute_json<T: DeserializeOwned>(
        &self,
        method: Method,
        endpoint: Endpoint,
        params: &RequestParams,
        priority: RequestPriority,
    ) -> Result<T, BinanceError> {
        let body = self
            .execute_with_priority(method, endpoint, params, priority)
            .await?;
        decode(&body)
    }

    /// Execute at an explicit priority.
    pub async fn execute_with_priority(
        &self,
        method: Method,
        endpoint: Endpoint,
        params: &RequestParams,
        priority: RequestPriority,
    ) -> Result<String, BinanceError> {
        let cost = endpoint.cost(&method);
        let mut backoff = self.retry.backoff();
        let mut attempts: u32 = 0;
        let mut reached_exchange = false;
        let mut ban: Option<(DateTime<Utc>, String)> = None;

        let outcome = loop {
            if let Err(denied) = self
                .admission
                .wait_for_slot(cost, priority, self.wait_ceiling)
                .await
            {
                break Err(match &ban {
                    Some((until, message)) => BinanceError::RateLimited {
                        banned_until: *until,
                        message: message.clone(),
                    },
                    None => BinanceError::AdmissionDenied(denied),
                });
            }

            attempts += 1;
            let failure = match self.attempt(&method, endpoint, params).await {
                Ok(body) => {
                    reached_exchange = true;
                    break Ok(body);
                }
                Err(failure) => failure,
            };

            let (error, hint) = match failure {
                AttemptFailure::Terminal(error) => {
                    reached_exchange |= matches!(error, BinanceError::Api { .. });
                    break Err(error);
                }
                AttemptFailure::Retry { error, hint } => {
                    reached_exchange |= matches!(error, BinanceError::Api { .. });
                    (error, hint)
                }
                AttemptFailure::RateLimited {
                    server_until,
                    message,
                } => {
                    let until = if ban.is_none() {
                        self.admission.record_rate_limit_error(server_until)
                    } else {
                        self.admission.extend_ban(server_until)
                    };
                    warn!(
                        endpoint = %endpoint,
                        banned_until = %until,
                        message = %message,
                        "Exchange rate limit hit"
                    );
                    ban = Some((until, message.clone()));
                    (
                        BinanceError::RateLimited {
                            banned_until: until,
                            message,
                        },
                        None,
                    )
                }
            };

            let next = match hint {
                Some(hint) => backoff.next_with_hint(hint),
                None => backoff.next_backoff(),
            };
            match next {
                Some(delay) => {
                    metrics::record_exchange_retry(endpoint.label());
                    warn!(
                        endpoint = %endpoint,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Retryable exchange error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    break Err(match (&ban, error) {
                        (Some((until, message)), _) => BinanceError::RateLimited {
                            banned_until: *until,
                            message: message.clone(),
                        },
                        (None, error) => BinanceError::RetriesExhausted {
                            attempts,
                            last: error.to_string(),
                        },
                    });
                }
            }
        };

        if ban.is_none() && reached_exchange {
            self.admission.record_request(cost);
        }
        outcome
    }

    async fn attempt(
        &self,
        method: &Method,
        endpoint: Endpoint,
        params: &RequestParams,
    ) -> Result<String, AttemptFailure> {
        let signed = endpoint.is_signed();
        let prepared = self
            .signer
            .prepare(
                params,
                signed,
                endpoint.requires_api_key(),
                Utc::now().timestamp_millis(),
            )
            .map_err(AttemptFailure::Terminal)?;

        let url = if prepared.query.is_empty() {
            format!("{}{}", self.base_url, endpoint.path())
        } else {
            format!("{}{}?{}", self.base_url, endpoint.path(), prepared.query)
        };
        let client = if signed {
            &self.signed_client
        } else {
            &self.public_client
        };
        let mut request = client.request(method.clone(), &url);
        if let Some(key) = &prepared.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        debug!(method = %method, endpoint = %endpoint, "Sending exchange request");
        let started = Instant::now();
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_exchange_request(
                    endpoint.label(),
                    "network",
                    started.elapsed().as_secs_f64(),
                );
                return Err(AttemptFailure::Retry {
                    error: BinanceError::Network(e.to_string()),
                    hint: None,
                });
            }
        };

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        self.admission
            .update_from_response_headers(header_snapshot(&headers));
        let retry_after = headers
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                metrics::record_exchange_request(
                    endpoint.label(),
                    "network",
                    started.elapsed().as_secs_f64(),
                );
                return Err(AttemptFailure::Retry {
                    error: BinanceError::Network(e.to_string()),
                    hint: None,
                });
            }
        };
        let latency = started.elapsed().as_secs_f64();

        if (200..300).contains(&status) {
            metrics::record_exchange_request(endpoint.label(), "success", latency);
            return Ok(body);
        }

        let (code, message) = match serde_json::from_str::<BinanceErrorResponse>(&body) {
            Ok(err) => (Some(err.code), err.msg),
            Err(_) => (None, body),
        };
        let class = classify(status, code);
        let outcome = match class {
            ErrorClass::Retryable => "retryable",
            ErrorClass::RateLimit => "rate_limited",
            ErrorClass::Permanent | ErrorClass::Duplicate | ErrorClass::Benign => "rejected",
        };
        metrics::record_exchange_request(endpoint.label(), outcome, latency);

        match class {
            ErrorClass::RateLimit => {
                let server_until = parse_ban_until(&message).or_else(|| {
                    retry_after
                        .and_then(|d| chrono::TimeDelta::from_std(d).ok())
                        .map(|d| Utc::now() + d)
                });
                Err(AttemptFailure::RateLimited {
                    server_until,
                    message,
                })
            }
            ErrorClass::Retryable => Err(AttemptFailure::Retry {
                error: BinanceError::Api {
                    status,
                    code: code.unwrap_or_default(),
                    message,
                    class,
                },
                hint: retry_after,
            }),
            ErrorClass::Permanent | ErrorClass::Duplicate | ErrorClass::Benign => {
                Err(AttemptFailure::Terminal(BinanceError::Api {
                    status,
                    code: code.unwrap_or_default(),
                    message,
                    class,
                }))
            }
        }
    }
}

/// Decode a JSON body; an empty body decodes as `null`.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T, BinanceError> {
    let body = if body.trim().is_empty() { "null" } else { body };
    serde_json::from_str(body).map_err(|e| BinanceError::Decode(e.to_string()))
}

fn header_snapshot(headers: &HeaderMap) -> HeaderSnapshot {
    let read = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u32>().ok())
    };
    HeaderSnapshot {
        used_weight_1m: read(USED_WEIGHT_HEADER),
        order_count_1m: read(ORDER_COUNT_HEADER),
    }
}
