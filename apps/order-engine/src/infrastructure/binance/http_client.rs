//! HTTP client wrapper with signing and retry logic.

use std::time::Duration;

use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;

use super::config::BinanceConfig;
use super::error::BinanceError;
use super::retry::{ExponentialBackoff, RetryPolicy};
use super::signing::{sign, timestamp_ms};
use super::types::BinanceErrorResponse;

/// Whether an endpoint needs a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Security {
    /// Market data; no key.
    Public,
    /// Account and trade endpoints; key header plus signature.
    Signed,
}

/// HTTP client for the futures REST API.
#[derive(Clone)]
pub struct BinanceHttpClient {
    client: Client,
    api_key: String,
    api_secret: String,
    base_url: String,
    recv_window_ms: u64,
    retry: RetryPolicy,
}

impl std::fmt::Debug for BinanceHttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceHttpClient")
            .field("base_url", &self.base_url)
            .field("recv_window_ms", &self.recv_window_ms)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl BinanceHttpClient {
    /// Create a client from config.
    pub fn new(config: &BinanceConfig) -> Result<Self, BinanceError> {
        if config.api_key.is_empty() || config.api_secret.is_empty() {
            return Err(BinanceError::AuthenticationFailed(
                "API key and secret are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BinanceError::Http(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
            base_url: config.base_url().trim_end_matches('/').to_string(),
            recv_window_ms: config.recv_window_ms,
            retry: config.retry.clone(),
        })
    }

    /// Public GET.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, BinanceError> {
        self.request(Method::GET, path, params, Security::Public).await
    }

    /// Signed request.
    pub async fn signed<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, BinanceError> {
        self.request(method, path, params, Security::Signed).await
    }

    /// Request with retry. Each attempt is re-signed with a fresh timestamp.
    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        security: Security,
    ) -> Result<T, BinanceError> {
        let mut backoff = ExponentialBackoff::new(&self.retry);
        // Set once a state-changing attempt may have been applied unseen.
        let mut unanswered = false;

        loop {
            let error = match self.send_once(method.clone(), path, params, security).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() => e,
                Err(e) if unanswered => {
                    tracing::error!(
                        method = %method,
                        path,
                        error = %e,
                        "Retry failed after an unanswered attempt; outcome unknown"
                    );
                    return Err(BinanceError::Unconfirmed(e.to_string()));
                }
                Err(e) => return Err(e),
            };
            if method != Method::GET && error.may_have_reached_exchange() {
                unanswered = true;
            }

            let attempt = backoff.attempt();
            let Some(delay) = backoff.next_backoff() else {
                tracing::warn!(
                    method = %method,
                    path,
                    attempt,
                    error = %error,
                    "Retries exhausted"
                );
                return Err(error);
            };
            let delay = match &error {
                BinanceError::RateLimited {
                    retry_after_secs: Some(secs),
                    ..
                } => Duration::from_secs(*secs),
                _ => delay,
            };

            tracing::warn!(
                method = %method,
                path,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "Transient error, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn send_once<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        security: Security,
    ) -> Result<T, BinanceError> {
        let url = self.build_url(path, params, security)?;
        let mut request = self.client.request(method, url);
        if security == Security::Signed {
            request = request.header("X-MBX-APIKEY", &self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                BinanceError::Timeout
            } else {
                BinanceError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            let text = response
                .text()
                .await
                .map_err(|e| BinanceError::Network(e.to_string()))?;
            return serde_json::from_str(&text).map_err(|e| BinanceError::JsonParse(e.to_string()));
        }

        let retry_after_secs = response
            .headers()
            .get("Retry-After")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        match status.as_u16() {
            429 | 418 => Err(BinanceError::RateLimited {
                status: status.as_u16(),
                retry_after_secs,
            }),
            _ => {
                let (code, message) = match serde_json::from_str::<BinanceErrorResponse>(&body) {
                    Ok(err) => (err.code, err.msg),
                    Err(_) => (0, body),
                };
                Err(BinanceError::Api {
                    status: status.as_u16(),
                    code,
                    message,
                })
            }
        }
    }

    fn build_url(
        &self,
        path: &str,
        params: &[(&str, String)],
        security: Security,
    ) -> Result<Url, BinanceError> {
        let mut url = Url::parse(&format!("{}{path}", self.base_url))
            .map_err(|e| BinanceError::Http(e.to_string()))?;

        if !params.is_empty() || security == Security::Signed {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            if security == Security::Signed {
                pairs.append_pair("recvWindow", &self.recv_window_ms.to_string());
                pairs.append_pair("timestamp", &timestamp_ms().to_string());
            }
        }

        if security == Security::Signed {
            let payload = url.query().unwrap_or_default().to_string();
            let signature = sign(&self.api_secret, &payload)?;
            url.query_pairs_mut().append_pair("signature", &signature);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::binance::config::BinanceEnvironment;

    fn client() -> BinanceHttpClient {
        let config = BinanceConfig::new("key".into(), "secret".into(), BinanceEnvironment::Testnet);
        BinanceHttpClient::new(&config).unwrap()
    }

    #[test]
    fn requires_credentials() {
        let config = BinanceConfig::new(String::new(), "secret".into(), BinanceEnvironment::Testnet);
        assert!(matches!(
            BinanceHttpClient::new(&config),
            Err(BinanceError::AuthenticationFailed(_))
        ));
    }

    #[test]
    fn public_url_has_no_signature() {
        let url = client()
            .build_url("/fapi/v1/ticker/price", &[("symbol", "BTCUSDT".into())], Security::Public)
            .unwrap();
        assert_eq!(url.as_str(), "https://testnet.binancefuture.com/fapi/v1/ticker/price?symbol=BTCUSDT");
    }

    #[test]
    fn bare_public_url_has_no_query() {
        let url = client().build_url("/fapi/v1/ping", &[], Security::Public).unwrap();
        assert_eq!(url.query(), None);
    }

    #[test]
    fn signed_url_signs_everything_before_signature() {
        let url = client()
            .build_url("/fapi/v1/order", &[("symbol", "BTCUSDT".into())], Security::Signed)
            .unwrap();
        let query = url.query().unwrap();
        let (payload, signature) = query.rsplit_once("&signature=").unwrap();
        assert!(payload.starts_with("symbol=BTCUSDT&recvWindow=5000&timestamp="));
        assert_eq!(signature, sign("secret", payload).unwrap());
    }
}
