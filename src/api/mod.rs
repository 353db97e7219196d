//! Router assembly.

use std::sync::Arc;

use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorError,
    GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::RateLimitConfig;
use crate::errors::GatewayError;
use crate::handlers::{self, AppState};

/// Request bodies are a handful of short fields.
const MAX_BODY_BYTES: usize = 16 * 1024;

/// Proxy endpoints, mounted both at the root and under `/api`.
fn endpoints() -> Router<Arc<AppState>> {
    Router::new()
        .route("/cpf", get(handlers::cpf_lookup))
        .route(
            "/sms",
            get(handlers::sms_verification).post(handlers::sms_verification),
        )
        .route(
            "/sms-start",
            get(handlers::sms_start).post(handlers::sms_start),
        )
}

fn assemble(state: Arc<AppState>, endpoints: Router<Arc<AppState>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .merge(endpoints.clone())
        .nest("/api", endpoints)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(middleware::from_fn(json_error_envelope))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Rewrites plain-text error responses from the HTTP stack (404, 405, 413,
/// extractor rejections) into the `{success:false, error}` envelope.
///
/// JSON responses pass through untouched; handler errors already use the envelope.
async fn json_error_envelope(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |v| v.starts_with("application/json"));
    if is_json {
        return response;
    }

    let (parts, _) = response.into_parts();
    let mut enveloped = GatewayError::rejected(status).into_response();
    for (name, value) in parts.headers.iter() {
        if name != header::CONTENT_TYPE && name != header::CONTENT_LENGTH {
            enveloped.headers_mut().insert(name.clone(), value.clone());
        }
    }
    enveloped
}

/// Governor refusals in the JSON envelope, keeping `Retry-After` style headers.
fn rate_limit_response(error: GovernorError) -> Response {
    match error {
        GovernorError::TooManyRequests { wait_time, headers } => {
            tracing::warn!("Rate limit exceeded, retry in {}s", wait_time);
            let mut response = GatewayError::Rejected {
                status: StatusCode::TOO_MANY_REQUESTS,
                message: format!("Muitas requisições, tente novamente em {}s", wait_time),
            }
            .into_response();
            if let Some(headers) = headers {
                response.headers_mut().extend(headers);
            }
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(wait_time));
            response
        }
        GovernorError::UnableToExtractKey => {
            GatewayError::Internal("client IP could not be determined".into()).into_response()
        }
        GovernorError::Other { code, msg, .. } => GatewayError::Rejected {
            status: code,
            message: msg.unwrap_or_else(|| GatewayError::rejected(code).to_string()),
        }
        .into_response(),
    }
}

/// Router without rate limiting.
pub fn router(state: Arc<AppState>) -> Router {
    assemble(state, endpoints())
}

/// Router with per-IP rate limiting on the proxy endpoints. `/health` is exempt.
///
/// The root and `/api` mounts share one quota per client.
/// Needs `into_make_service_with_connect_info::<SocketAddr>()` when served
/// without a proxy that sets forwarding headers.
pub fn rate_limited_router(
    state: Arc<AppState>,
    limits: RateLimitConfig,
) -> anyhow::Result<Router> {
    let period = limits
        .replenish_period()
        .ok_or_else(|| anyhow::anyhow!("Invalid rate limit: {} per second", limits.per_second))?;

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .period(period)
            .burst_size(limits.burst)
            .key_extractor(SmartIpKeyExtractor)
            .error_handler(rate_limit_response)
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Invalid rate limit configuration"))?,
    );

    let limited = endpoints().layer(ServiceBuilder::new().layer(GovernorLayer {
        config: governor_conf,
    }));

    Ok(assemble(state, limited))
}
