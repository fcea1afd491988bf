//! Rate limiting filter and headers for HTTP routes

use log::warn;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::{HeaderMap, HeaderValue};
use warp::reject::Reject;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

use crate::constants::{HEADER_RATE_LIMIT, HEADER_RATE_REMAINING, HEADER_RETRY_AFTER};
use crate::core::client_identity::client_identity;
use crate::core::rate_limiter::{EndpointClass, RateLimitDecision, SharedRateLimiter};

/// Request refused by the token bucket of its endpoint class
#[derive(Debug)]
pub struct RateLimited {
    pub class: EndpointClass,
    pub decision: RateLimitDecision,
}

impl Reject for RateLimited {}

/// Admit a request under `class` limits, yielding the decision for reply headers
pub fn rate_limit(
    limiter: SharedRateLimiter,
    class: EndpointClass,
) -> impl Filter<Extract = (RateLimitDecision,), Error = Rejection> + Clone {
    warp::header::headers_cloned()
        .and(warp::addr::remote())
        .and_then(move |headers: HeaderMap, remote: Option<SocketAddr>| {
            let limiter = Arc::clone(&limiter);
            async move {
                let identity = client_identity(&headers, remote);
                let decision = limiter.check(&identity, class).await;
                if decision.allowed {
                    Ok(decision)
                } else {
                    warn!(
                        "Rate limit exceeded for {} on {} endpoints, retry in {}s",
                        identity,
                        class,
                        decision.retry_after_secs()
                    );
                    Err(warp::reject::custom(RateLimited { class, decision }))
                }
            }
        })
}

/// Attach limit and remaining-token headers to a reply
pub fn with_rate_limit_headers<T: Reply>(reply: T, decision: &RateLimitDecision) -> Response {
    let mut response = reply.into_response();
    let headers = response.headers_mut();
    headers.insert(HEADER_RATE_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(HEADER_RATE_REMAINING, HeaderValue::from(decision.remaining));
    if !decision.allowed {
        headers.insert(HEADER_RETRY_AFTER, HeaderValue::from(decision.retry_after_secs()));
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use warp::http::StatusCode;

    #[test]
    fn test_allowed_reply_has_no_retry_after() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 50,
            remaining: 49,
            retry_after: Duration::ZERO,
        };
        let response = with_rate_limit_headers(warp::reply(), &decision);

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HEADER_RATE_LIMIT], "50");
        assert_eq!(response.headers()[HEADER_RATE_REMAINING], "49");
        assert!(response.headers().get(HEADER_RETRY_AFTER).is_none());
    }

    #[test]
    fn test_denied_reply_rounds_retry_after_up() {
        let decision = RateLimitDecision {
            allowed: false,
            limit: 5,
            remaining: 0,
            retry_after: Duration::from_millis(2300),
        };
        let response = with_rate_limit_headers(warp::reply(), &decision);
        assert_eq!(response.headers()[HEADER_RETRY_AFTER], "3");
        assert_eq!(response.headers()[HEADER_RATE_REMAINING], "0");
    }
}
