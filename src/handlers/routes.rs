//! HTTP surface: the WebSocket upgrade and the health endpoint

use serde::Serialize;
use std::convert::Infallible;
use warp::http::HeaderValue;
use warp::ws::Ws;
use warp::{Filter, Reply};

use crate::auth::token::SharedSessionResolver;
use crate::auth::user::Session;
use crate::config::HubConfig;
use crate::constants::{HEALTH_PATH, WS_PATH};
use crate::core::hub::{HubHandle, HubStats};
use crate::core::rate_limiter::{EndpointClass, RateLimitDecision, SharedRateLimiter};
use crate::handlers::auth::{bearer_subprotocol, with_session};
use crate::handlers::rate_limit::{rate_limit, with_rate_limit_headers};
use crate::handlers::rejection::handle_rejection;
use crate::handlers::websocket::handle_ws_client;

/// Everything the routes need, shared across requests
#[derive(Clone)]
pub struct ServerState {
    pub hub: HubHandle,
    pub limiter: SharedRateLimiter,
    pub resolver: SharedSessionResolver,
    pub hub_config: HubConfig,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    hub: HubStats,
}

fn with_hub(hub: HubHandle) -> impl Filter<Extract = (HubHandle,), Error = Infallible> + Clone {
    warp::any().map(move || hub.clone())
}

fn with_hub_config(config: HubConfig) -> impl Filter<Extract = (HubConfig,), Error = Infallible> + Clone {
    warp::any().map(move || config.clone())
}

/// Build all routes with rejection handling applied
pub fn routes(
    state: ServerState,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let ws_route = warp::path(WS_PATH)
        .and(warp::path::end())
        .and(warp::get())
        .and(rate_limit(state.limiter.clone(), EndpointClass::Api))
        .and(with_session(state.resolver.clone()))
        .and(warp::ws())
        .and(warp::header::headers_cloned())
        .and(with_hub(state.hub.clone()))
        .and(with_hub_config(state.hub_config.clone()))
        .map(
            |decision: RateLimitDecision,
             session: Session,
             ws: Ws,
             headers: warp::http::HeaderMap,
             hub: HubHandle,
             config: HubConfig| {
                let protocol = bearer_subprotocol(&headers)
                    .and_then(|entry| HeaderValue::from_str(entry).ok());
                let reply = ws
                    .max_message_size(config.max_frame_size)
                    .on_upgrade(move |socket| handle_ws_client(socket, session, hub, config));

                let mut response = with_rate_limit_headers(reply, &decision);
                // Browsers drop the socket unless an offered subprotocol is echoed
                if let Some(protocol) = protocol {
                    response
                        .headers_mut()
                        .insert("sec-websocket-protocol", protocol);
                }
                response
            },
        );

    let health_route = warp::path(HEALTH_PATH)
        .and(warp::path::end())
        .and(warp::get())
        .and(with_hub(state.hub))
        .map(|hub: HubHandle| {
            let status = if hub.is_running() { "ok" } else { "degraded" };
            warp::reply::json(&HealthReport {
                status,
                hub: hub.stats(),
            })
        });

    ws_route.or(health_route).recover(handle_rejection)
}
