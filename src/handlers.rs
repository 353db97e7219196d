use std::sync::Arc;

use axum::{
    async_trait,
    body::Bytes,
    extract::{FromRequestParts, Query, State},
    http::{header, request::Parts, HeaderMap, Method, StatusCode},
    Json,
};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::config::Config;
use crate::errors::{GatewayError, ResultExt};
use crate::input::{CpfParams, LookupRequest, SmsParams, VerificationRequest, VerificationStep};
use crate::models::{
    normalize_lookup, normalize_verification_check, normalize_verification_start, DataEnvelope,
    LookupResult, SmsResponse,
};
use crate::obs::mask;
use crate::services::{build_http_client, CpfHubClient, TwilioVerifyClient};

/// Shared application state injected into handlers.
///
/// Read-only after startup.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration, loaded once.
    pub config: Config,
    /// HTTP client shared by all provider calls.
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, GatewayError> {
        let http = build_http_client(config.upstream_timeout)?;
        Ok(Self { config, http })
    }
}

/// Query string extractor whose rejection is a [`GatewayError::Validation`].
///
/// Duplicated or malformed parameters answer 400 in the JSON envelope
/// instead of axum's plain-text rejection.
#[derive(Debug)]
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = GatewayError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ValidQuery(value)),
            Err(rejection) => {
                tracing::debug!("Query string rejected: {}", rejection.body_text());
                Err(GatewayError::Validation(
                    "Parâmetros de consulta inválidos".into(),
                ))
            }
        }
    }
}

/// Health check endpoint.
///
/// Reports whether each provider has credentials; never calls them.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "providers": {
                "cpf": { "configured": state.config.cpf_provider.is_configured() },
                "sms": { "configured": state.config.otp_provider.is_configured() },
            }
        })),
    )
}

/// GET /cpf?cpf=...
///
/// Validates the CPF, looks it up once and answers `{success:true, data:{name, birthDate}}`.
pub async fn cpf_lookup(
    State(state): State<Arc<AppState>>,
    ValidQuery(params): ValidQuery<CpfParams>,
) -> Result<Json<DataEnvelope<LookupResult>>, GatewayError> {
    let request = LookupRequest::parse(params.cpf.as_deref())?;
    tracing::info!("GET /cpf - cpf: {}", mask(&request.cpf, 2));

    let provider = state.config.cpf_provider.require()?;
    let client = CpfHubClient::new(state.http.clone(), provider);

    let upstream = client
        .lookup_cpf(&request.cpf)
        .await
        .context("CPF lookup")?
        .into_success(CpfHubClient::PROVIDER)?;

    let result = normalize_lookup(&upstream.body);
    if result.name.is_empty() {
        tracing::warn!(
            "CPF provider returned no name for {}",
            mask(&request.cpf, 2)
        );
    }

    Ok(Json(DataEnvelope::ok(result)))
}

/// GET|POST /sms?step=start|check&phone=...&code=...
///
/// POST bodies (JSON or form) are merged over the query string.
pub async fn sms_verification(
    State(state): State<Arc<AppState>>,
    method: Method,
    ValidQuery(query): ValidQuery<SmsParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SmsResponse>, GatewayError> {
    let params = collect_params(&method, query, &headers, &body)?;
    tracing::info!("{} /sms - step: {:?}", method, params.step);

    let request = VerificationRequest::parse(params, &state.config.phone_policy)?;
    run_verification(&state, request).await
}

/// GET|POST /sms-start?phone=...
///
/// Shortcut for `/sms?step=start`; any `step` sent is ignored.
pub async fn sms_start(
    State(state): State<Arc<AppState>>,
    method: Method,
    ValidQuery(query): ValidQuery<SmsParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SmsResponse>, GatewayError> {
    let mut params = collect_params(&method, query, &headers, &body)?;
    params.step = Some(VerificationStep::Start.as_str().to_string());
    tracing::info!("{} /sms-start", method);

    let request = VerificationRequest::parse(params, &state.config.phone_policy)?;
    run_verification(&state, request).await
}

async fn run_verification(
    state: &AppState,
    request: VerificationRequest,
) -> Result<Json<SmsResponse>, GatewayError> {
    let provider = state.config.otp_provider.require()?;
    let client = TwilioVerifyClient::new(state.http.clone(), provider);
    let kind = request.step.as_str();

    let result = match &request.step {
        VerificationStep::Start => {
            let upstream = client
                .start_verification(&request.phone)
                .await
                .context("SMS verification start")?
                .into_success(TwilioVerifyClient::PROVIDER)?;
            normalize_verification_start(&upstream.body)
        }
        VerificationStep::Check { code } => {
            let upstream = client
                .check_verification(&request.phone, code)
                .await
                .context("SMS verification check")?
                .into_success(TwilioVerifyClient::PROVIDER)?;
            normalize_verification_check(&upstream.body)
        }
    };

    tracing::info!(
        "SMS {} for {} -> status '{}'",
        kind,
        mask(&request.phone, 4),
        result.status
    );

    Ok(Json(SmsResponse::new(kind, request.phone, result)))
}

/// Query parameters, overlaid with the body for POST requests.
fn collect_params(
    method: &Method,
    query: SmsParams,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<SmsParams, GatewayError> {
    if *method != Method::POST || body.is_empty() {
        return Ok(query);
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    let from_body = if content_type.starts_with("application/json") {
        serde_json::from_slice::<SmsParams>(body)
            .map_err(|_| GatewayError::Validation("Corpo JSON inválido".into()))?
    } else if content_type.starts_with("application/x-www-form-urlencoded") {
        let mut params = SmsParams::default();
        for (key, value) in url::form_urlencoded::parse(body) {
            match &*key {
                "step" => params.step = Some(value.into_owned()),
                "phone" => params.phone = Some(value.into_owned()),
                "code" => params.code = Some(value.into_owned()),
                _ => {}
            }
        }
        params
    } else {
        tracing::debug!("Ignoring POST body with content type '{}'", content_type);
        SmsParams::default()
    };

    Ok(query.merge(from_body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers_with(content_type: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, content_type.parse().unwrap());
        headers
    }

    #[test]
    fn test_get_ignores_body() {
        let query = SmsParams {
            phone: Some("111".into()),
            ..Default::default()
        };
        let params = collect_params(
            &Method::GET,
            query,
            &headers_with("application/json"),
            &Bytes::from_static(br#"{"phone":"222"}"#),
        )
        .unwrap();
        assert_eq!(params.phone.as_deref(), Some("111"));
    }

    #[test]
    fn test_post_form_body() {
        let params = collect_params(
            &Method::POST,
            SmsParams::default(),
            &headers_with("application/x-www-form-urlencoded"),
            &Bytes::from_static(b"step=check&phone=%2B5511999999999&code=123456"),
        )
        .unwrap();
        assert_eq!(params.step.as_deref(), Some("check"));
        assert_eq!(params.phone.as_deref(), Some("+5511999999999"));
        assert_eq!(params.code.as_deref(), Some("123456"));
    }

    #[test]
    fn test_post_json_numeric_code() {
        let params = collect_params(
            &Method::POST,
            SmsParams::default(),
            &headers_with("application/json"),
            &Bytes::from_static(br#"{"step":"check","phone":"+5511999999999","code":123456}"#),
        )
        .unwrap();
        assert_eq!(params.code.as_deref(), Some("123456"));
    }

    #[tokio::test]
    async fn test_duplicate_query_parameter_is_validation_error() {
        let request = axum::http::Request::builder()
            .uri("/cpf?cpf=123&cpf=45678901")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let err = ValidQuery::<CpfParams>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Validation(_)));
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_post_malformed_json() {
        let err = collect_params(
            &Method::POST,
            SmsParams::default(),
            &headers_with("application/json; charset=utf-8"),
            &Bytes::from_static(b"{not json"),
        )
        .unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }
}
