use std::time::{Duration, Instant};

use reqwest::{header, Client, RequestBuilder};

use crate::config::{CpfAuthScheme, CpfEndpointStyle, CpfProviderConfig, OtpProviderConfig};
use crate::errors::GatewayError;
use crate::models::RawUpstreamResponse;
use crate::obs::mask;

/// Builds the HTTP client shared by every provider call.
///
/// No timeout unless one is configured.
pub fn build_http_client(timeout: Option<Duration>) -> Result<Client, GatewayError> {
    let mut builder = Client::builder().user_agent(concat!(
        env!("CARGO_PKG_NAME"),
        "/",
        env!("CARGO_PKG_VERSION")
    ));
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder
        .build()
        .map_err(|e| GatewayError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Sends one request, exactly once, and captures status and body.
async fn execute(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<RawUpstreamResponse, GatewayError> {
    let started = Instant::now();
    let response = request.send().await.map_err(|e| GatewayError::Transport {
        provider,
        detail: e.to_string(),
    })?;

    let status = response.status();
    let text = response.text().await.map_err(|e| GatewayError::Transport {
        provider,
        detail: format!("failed to read body: {}", e),
    })?;

    tracing::info!(
        "{} answered {} in {}ms",
        provider,
        status,
        started.elapsed().as_millis()
    );

    Ok(RawUpstreamResponse::from_parts(status, &text))
}

/// Client for the CPF lookup provider.
#[derive(Clone)]
pub struct CpfHubClient {
    client: Client,
    base_url: String,
    token: String,
    auth_scheme: CpfAuthScheme,
    endpoint_style: CpfEndpointStyle,
}

impl CpfHubClient {
    pub const PROVIDER: &'static str = "cpfhub";

    pub fn new(client: Client, config: &CpfProviderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            auth_scheme: config.auth_scheme,
            endpoint_style: config.endpoint_style,
        }
    }

    /// Lookup URL for an already normalized CPF.
    pub fn lookup_url(&self, cpf: &str) -> Result<reqwest::Url, GatewayError> {
        let url = match self.endpoint_style {
            CpfEndpointStyle::Path => reqwest::Url::parse(&format!("{}/cpf/{}", self.base_url, cpf)),
            CpfEndpointStyle::Query => reqwest::Url::parse_with_params(
                &format!("{}/consulta", self.base_url),
                &[("cpf", cpf)],
            ),
        };
        url.map_err(|e| {
            GatewayError::Configuration(vec![format!("CPFHUB_BASE_URL (invalid URL: {})", e)])
        })
    }

    /// `GET` the provider for one CPF. Non-2xx answers are returned, not raised.
    pub async fn lookup_cpf(&self, cpf: &str) -> Result<RawUpstreamResponse, GatewayError> {
        let url = self.lookup_url(cpf)?;
        tracing::info!("Looking up CPF {} at {}", mask(cpf, 2), self.base_url);

        let request = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json");
        let request = match self.auth_scheme {
            CpfAuthScheme::Bearer => request.bearer_auth(&self.token),
            CpfAuthScheme::ApiKey => request.header("x-api-key", &self.token),
        };

        execute(Self::PROVIDER, request).await
    }
}

/// Client for the Twilio Verify OTP service.
#[derive(Clone)]
pub struct TwilioVerifyClient {
    client: Client,
    base_url: String,
    account_sid: String,
    auth_token: String,
    service_sid: String,
}

impl TwilioVerifyClient {
    pub const PROVIDER: &'static str = "twilio-verify";

    pub fn new(client: Client, config: &OtpProviderConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            service_sid: config.service_sid.clone(),
        }
    }

    fn service_url(&self, resource: &str) -> String {
        format!("{}/Services/{}/{}", self.base_url, self.service_sid, resource)
    }

    fn post_form(&self, resource: &str, form: &[(&str, &str)]) -> RequestBuilder {
        self.client
            .post(self.service_url(resource))
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .header(header::ACCEPT, "application/json")
            .form(form)
    }

    /// Sends an OTP by SMS. Every call sends a new message; callers own deduplication.
    pub async fn start_verification(&self, phone: &str) -> Result<RawUpstreamResponse, GatewayError> {
        tracing::info!("Starting SMS verification for {}", mask(phone, 4));
        let request = self.post_form("Verifications", &[("To", phone), ("Channel", "sms")]);
        execute(Self::PROVIDER, request).await
    }

    /// Checks a code previously sent to `phone`.
    pub async fn check_verification(
        &self,
        phone: &str,
        code: &str,
    ) -> Result<RawUpstreamResponse, GatewayError> {
        tracing::info!("Checking SMS verification code for {}", mask(phone, 4));
        let request = self.post_form("VerificationChecks", &[("To", phone), ("Code", code)]);
        execute(Self::PROVIDER, request).await
    }
}
