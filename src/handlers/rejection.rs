//! Rendering of rejected requests

use serde::Serialize;
use std::convert::Infallible;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

use crate::error::RustyHubError;
use crate::handlers::auth::UpgradeRejected;
use crate::handlers::rate_limit::{with_rate_limit_headers, RateLimited};

#[derive(Serialize)]
struct ErrorBody {
    code: u16,
    error: String,
}

fn error_reply(status: StatusCode, message: impl Into<String>) -> warp::reply::WithStatus<warp::reply::Json> {
    let body = ErrorBody {
        code: status.as_u16(),
        error: message.into(),
    };
    warp::reply::with_status(warp::reply::json(&body), status)
}

/// Turn rejections into JSON error responses.
///
/// 429 for rate limiting (with limit and retry headers), 401 or 403 for
/// refused upgrades, 404 for unknown routes and 400 for anything else.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    if let Some(limited) = err.find::<RateLimited>() {
        let reply = error_reply(
            StatusCode::TOO_MANY_REQUESTS,
            format!("Too many {} requests", limited.class),
        );
        return Ok(with_rate_limit_headers(reply, &limited.decision));
    }

    if let Some(UpgradeRejected(cause)) = err.find::<UpgradeRejected>() {
        let status = match cause {
            RustyHubError::WorkspaceMismatch { .. } => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        };
        return Ok(error_reply(status, cause.to_string()).into_response());
    }

    if err.is_not_found() {
        return Ok(error_reply(StatusCode::NOT_FOUND, "Not found").into_response());
    }

    if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        return Ok(error_reply(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed").into_response());
    }

    log::debug!("Unhandled rejection: {:?}", err);
    Ok(error_reply(StatusCode::BAD_REQUEST, "Bad request").into_response())
}
