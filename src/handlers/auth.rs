//! Authentication handlers for WebSocket upgrades
//!
//! A session is resolved from the request headers before any connection
//! object exists. Tokens are never read from the URL.

use serde::Deserialize;
use std::sync::Arc;
use warp::http::HeaderMap;
use warp::reject::Reject;
use warp::{Filter, Rejection};

use crate::auth::token::{extract_bearer_token, SessionResolver, SharedSessionResolver};
use crate::auth::user::Session;
use crate::error::{Result, RustyHubError};

const SUBPROTOCOL_HEADER: &str = "sec-websocket-protocol";
const SUBPROTOCOL_PREFIX: &str = "bearer.";
const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// Upgrade refused before a connection was created
#[derive(Debug)]
pub struct UpgradeRejected(pub RustyHubError);

impl Reject for UpgradeRejected {}

/// Optional workspace the client expects its session to be bound to
#[derive(Debug, Default, Deserialize)]
pub struct WorkspaceQuery {
    pub workspace_id: Option<i64>,
}

/// The `bearer.<token>` entry offered in `Sec-WebSocket-Protocol`, if any
pub fn bearer_subprotocol(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SUBPROTOCOL_HEADER)
        .and_then(|value| value.to_str().ok())?
        .split(',')
        .map(str::trim)
        .find(|entry| entry.starts_with(SUBPROTOCOL_PREFIX))
}

/// Find the session token in the upgrade request headers.
///
/// Checked in order: `Authorization: Bearer`, the `bearer.` subprotocol,
/// then `X-Auth-Token`.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(extract_bearer_token)
    {
        log::debug!("Token extracted from Authorization header");
        return Some(token);
    }

    if let Some(token) = bearer_subprotocol(headers)
        .and_then(|entry| entry.strip_prefix(SUBPROTOCOL_PREFIX))
        .filter(|token| !token.is_empty())
    {
        log::debug!("Token extracted from WebSocket subprotocol");
        return Some(token.to_string());
    }

    if let Some(token) = headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        log::debug!("Token extracted from X-Auth-Token header");
        return Some(token.to_string());
    }

    None
}

/// Resolve the caller's session and check the requested workspace binding
pub async fn authenticate_upgrade(
    resolver: &dyn SessionResolver,
    headers: &HeaderMap,
    requested_workspace: Option<i64>,
) -> Result<Session> {
    let token = extract_token(headers).ok_or(RustyHubError::Unauthorized)?;
    let session = resolver.resolve(&token).await?;

    if let Some(requested) = requested_workspace {
        if requested != session.workspace_id {
            return Err(RustyHubError::WorkspaceMismatch {
                requested,
                bound: session.workspace_id,
            });
        }
    }

    Ok(session)
}

/// Filter yielding the authenticated session of an upgrade request
pub fn with_session(
    resolver: SharedSessionResolver,
) -> impl Filter<Extract = (Session,), Error = Rejection> + Clone {
    warp::header::headers_cloned()
        .and(warp::query::<WorkspaceQuery>())
        .and_then(move |headers: HeaderMap, query: WorkspaceQuery| {
            let resolver = Arc::clone(&resolver);
            async move {
                match authenticate_upgrade(resolver.as_ref(), &headers, query.workspace_id).await
                {
                    Ok(session) => Ok(session),
                    Err(e) => {
                        log::warn!("WebSocket upgrade rejected: {}", e);
                        Err(warp::reject::custom(UpgradeRejected(e)))
                    }
                }
            }
        })
}
