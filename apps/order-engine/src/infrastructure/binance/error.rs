//! Binance-specific error types.

use thiserror::Error;

use crate::application::ports::GatewayError;

/// Errors from the Binance REST adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BinanceError {
    /// Request could not be built or sent.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Exchange returned an error payload.
    #[error("API error {code} (HTTP {status}): {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Exchange error code (`0` when the body carried none).
        code: i64,
        /// Exchange message.
        message: String,
    },

    /// Rate limited (HTTP 429, or 418 for an IP ban).
    #[error("Rate limited (HTTP {status})")]
    RateLimited {
        /// HTTP status.
        status: u16,
        /// `Retry-After` header in seconds, if sent.
        retry_after_secs: Option<u64>,
    },

    /// Credentials refused.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Connection failure.
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out.
    #[error("Request timed out")]
    Timeout,

    /// Response body did not parse.
    #[error("JSON parsing error: {0}")]
    JsonParse(String),

    /// Signature could not be computed.
    #[error("Signing error: {0}")]
    Signing(String),

    /// A state-changing request failed after an earlier attempt went
    /// unanswered, so the first attempt may have been applied.
    #[error("Unconfirmed after earlier unanswered attempt: {0}")]
    Unconfirmed(String),
}

/// Exchange error codes with a fixed meaning.
pub mod codes {
    /// Internal error; unable to process the request.
    pub const DISCONNECTED: i64 = -1001;
    /// Too many requests.
    pub const TOO_MANY_REQUESTS: i64 = -1003;
    /// Filter failure (LOT_SIZE, PRICE_FILTER, ...).
    pub const FILTER_FAILURE: i64 = -1013;
    /// Timestamp outside `recvWindow`.
    pub const INVALID_TIMESTAMP: i64 = -1021;
    /// Invalid symbol.
    pub const INVALID_SYMBOL: i64 = -1121;
    /// Balance insufficient.
    pub const BALANCE_INSUFFICIENT: i64 = -2018;
    /// Margin insufficient.
    pub const MARGIN_INSUFFICIENT: i64 = -2019;
    /// Quantity less than or equal to zero.
    pub const QUANTITY_NOT_POSITIVE: i64 = -4003;
}

impl BinanceError {
    /// Returns true if the request may succeed when repeated.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Network(_) | Self::Timeout => true,
            Self::Api { status, code, .. } => {
                matches!(*status, 408 | 500..=599)
                    || matches!(
                        *code,
                        codes::DISCONNECTED | codes::TOO_MANY_REQUESTS | codes::INVALID_TIMESTAMP
                    )
            }
            _ => false,
        }
    }

    /// Returns true if the request may have reached the exchange even though
    /// no definite answer came back.
    #[must_use]
    pub const fn may_have_reached_exchange(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout => true,
            Self::Api { status, code, .. } => {
                matches!(*status, 408 | 500..=599) || *code == codes::DISCONNECTED
            }
            _ => false,
        }
    }
}

impl From<BinanceError> for GatewayError {
    fn from(err: BinanceError) -> Self {
        match err {
            BinanceError::RateLimited { .. } => Self::RateLimited,
            BinanceError::Timeout => Self::Timeout,
            BinanceError::Network(message) => Self::Network { message },
            BinanceError::AuthenticationFailed(message) => Self::Authentication { message },
            BinanceError::Http(message) | BinanceError::Signing(message) => {
                Self::InvalidRequest { message }
            }
            BinanceError::JsonParse(message) | BinanceError::Unconfirmed(message) => {
                Self::Indeterminate { message }
            }
            BinanceError::Api {
                status,
                code,
                message,
            } => match code {
                codes::MARGIN_INSUFFICIENT | codes::BALANCE_INSUFFICIENT => {
                    Self::InsufficientFunds { message }
                }
                codes::QUANTITY_NOT_POSITIVE => Self::QuantityTooSmall { message },
                codes::FILTER_FAILURE if message.contains("LOT_SIZE") => {
                    Self::QuantityTooSmall { message }
                }
                codes::INVALID_SYMBOL => Self::SymbolNotFound { symbol: message },
                codes::TOO_MANY_REQUESTS => Self::RateLimited,
                codes::DISCONNECTED | codes::INVALID_TIMESTAMP => Self::Network { message },
                _ if status == 408 || status >= 500 => Self::Unavailable { message },
                _ if status == 401 || status == 403 => Self::Authentication { message },
                _ => Self::Rejected { code, message },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn api(status: u16, code: i64, message: &str) -> BinanceError {
        BinanceError::Api {
            status,
            code,
            message: message.to_string(),
        }
    }

    #[test_case(api(400, -2019, "Margin is insufficient."), "insufficient" ; "margin")]
    #[test_case(api(400, -4003, "Quantity less than or equal to zero."), "quantity" ; "non positive quantity")]
    #[test_case(api(400, -1013, "Filter failure: LOT_SIZE"), "quantity" ; "lot size filter")]
    #[test_case(api(400, -1121, "Invalid symbol."), "symbol" ; "invalid symbol")]
    #[test_case(api(400, -2010, "Order would immediately trigger."), "rejected" ; "other rejection")]
    #[test_case(api(503, 0, "Service Unavailable"), "unavailable" ; "server error")]
    #[test_case(api(401, -2015, "Invalid API-key"), "auth" ; "unauthorized")]
    fn maps_to_gateway_taxonomy(err: BinanceError, expected: &str) {
        let mapped = GatewayError::from(err);
        let kind = match mapped {
            GatewayError::InsufficientFunds { .. } => "insufficient",
            GatewayError::QuantityTooSmall { .. } => "quantity",
            GatewayError::SymbolNotFound { .. } => "symbol",
            GatewayError::Rejected { .. } => "rejected",
            GatewayError::Unavailable { .. } => "unavailable",
            GatewayError::Authentication { .. } => "auth",
            _ => "other",
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn retryable_classification() {
        assert!(api(400, codes::INVALID_TIMESTAMP, "Timestamp outside recvWindow").is_retryable());
        assert!(api(502, 0, "Bad Gateway").is_retryable());
        assert!(BinanceError::Timeout.is_retryable());
        assert!(!api(400, -2019, "Margin is insufficient.").is_retryable());
        assert!(!BinanceError::AuthenticationFailed("bad key".into()).is_retryable());
    }

    #[test]
    fn undecodable_success_is_neither_transient_nor_rejection() {
        for err in [
            BinanceError::JsonParse("expected value at line 1 column 1".into()),
            BinanceError::Unconfirmed("Margin is insufficient.".into()),
        ] {
            let mapped = GatewayError::from(err);
            assert!(matches!(mapped, GatewayError::Indeterminate { .. }));
            assert!(!mapped.is_transient());
            assert!(!mapped.is_rejection());
        }
    }

    #[test]
    fn unanswered_attempts_are_flagged() {
        assert!(BinanceError::Timeout.may_have_reached_exchange());
        assert!(api(503, 0, "Service Unavailable").may_have_reached_exchange());
        assert!(!api(400, codes::INVALID_TIMESTAMP, "Timestamp outside recvWindow").may_have_reached_exchange());
        assert!(
            !BinanceError::RateLimited {
                status: 429,
                retry_after_secs: None
            }
            .may_have_reached_exchange()
        );
    }

    #[test]
    fn exhausted_transients_stay_transient() {
        let mapped = GatewayError::from(api(400, codes::DISCONNECTED, "disconnected"));
        assert!(mapped.is_transient());
        let mapped = GatewayError::from(BinanceError::RateLimited {
            status: 429,
            retry_after_secs: Some(1),
        });
        assert!(mapped.is_transient());
    }
}
