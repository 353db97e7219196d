use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::GatewayError;
use crate::input::PhonePolicy;

/// Default OTP provider endpoint.
pub const DEFAULT_TWILIO_VERIFY_BASE_URL: &str = "https://verify.twilio.com/v2";

/// Provider credentials, or the names of what is missing.
///
/// Missing credentials do not stop the process; each request to the
/// provider answers 500 with the names instead.
#[derive(Debug, Clone)]
pub enum Credentials<T> {
    Configured(T),
    Missing(Vec<String>),
}

impl<T> Credentials<T> {
    pub fn require(&self) -> Result<&T, GatewayError> {
        match self {
            Credentials::Configured(value) => Ok(value),
            Credentials::Missing(names) => Err(GatewayError::Configuration(names.clone())),
        }
    }

    pub fn is_configured(&self) -> bool {
        matches!(self, Credentials::Configured(_))
    }
}

/// Header used to authenticate against the CPF provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpfAuthScheme {
    /// `Authorization: Bearer <token>`
    Bearer,
    /// `x-api-key: <token>`
    ApiKey,
}

impl FromStr for CpfAuthScheme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bearer" => Ok(CpfAuthScheme::Bearer),
            "api-key" | "apikey" | "x-api-key" => Ok(CpfAuthScheme::ApiKey),
            other => anyhow::bail!("CPFHUB_AUTH_SCHEME must be 'bearer' or 'api-key', got '{}'", other),
        }
    }
}

/// URL shape of the CPF lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpfEndpointStyle {
    /// `GET {base}/cpf/{cpf}`
    Path,
    /// `GET {base}/consulta?cpf={cpf}`
    Query,
}

impl FromStr for CpfEndpointStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "path" => Ok(CpfEndpointStyle::Path),
            "query" => Ok(CpfEndpointStyle::Query),
            other => anyhow::bail!("CPFHUB_ENDPOINT_STYLE must be 'path' or 'query', got '{}'", other),
        }
    }
}

#[derive(Clone)]
pub struct CpfProviderConfig {
    pub base_url: String,
    pub token: String,
    pub auth_scheme: CpfAuthScheme,
    pub endpoint_style: CpfEndpointStyle,
}

impl fmt::Debug for CpfProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpfProviderConfig")
            .field("base_url", &self.base_url)
            .field("token", &"[REDACTED]")
            .field("auth_scheme", &self.auth_scheme)
            .field("endpoint_style", &self.endpoint_style)
            .finish()
    }
}

#[derive(Clone)]
pub struct OtpProviderConfig {
    pub base_url: String,
    pub account_sid: String,
    pub auth_token: String,
    pub service_sid: String,
}

impl fmt::Debug for OtpProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtpProviderConfig")
            .field("base_url", &self.base_url)
            .field("account_sid", &self.account_sid)
            .field("auth_token", &"[REDACTED]")
            .field("service_sid", &self.service_sid)
            .finish()
    }
}

/// Per-IP limits applied to the proxy endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Sustained requests per second, per client IP.
    pub per_second: u64,
    /// Requests a client may make at once before the sustained rate applies.
    pub burst: u32,
}

impl RateLimitConfig {
    /// Interval after which one request of the burst quota is given back.
    ///
    /// `None` when `per_second` is zero or too large to express in nanoseconds.
    pub fn replenish_period(&self) -> Option<Duration> {
        if self.per_second == 0 {
            return None;
        }
        let nanos = 1_000_000_000 / self.per_second;
        (nanos > 0).then(|| Duration::from_nanos(nanos))
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_second: 10,
            burst: 20,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cpf_provider: Credentials<CpfProviderConfig>,
    pub otp_provider: Credentials<OtpProviderConfig>,
    pub phone_policy: PhonePolicy,
    /// `None` leaves upstream calls unbounded; the platform timeout applies.
    pub upstream_timeout: Option<Duration>,
    pub rate_limit: RateLimitConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup.
    pub fn from_source<F>(get: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = read("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?;

        let country_code = read("SMS_DEFAULT_COUNTRY_CODE")
            .unwrap_or_else(|| crate::input::DEFAULT_COUNTRY_CODE.to_string());
        if !country_code.chars().all(|c| c.is_ascii_digit()) {
            anyhow::bail!("SMS_DEFAULT_COUNTRY_CODE must contain digits only");
        }
        let strict = match read("SMS_STRICT_PHONE_VALIDATION").as_deref() {
            None => false,
            Some("1") | Some("true") | Some("TRUE") | Some("yes") => true,
            Some("0") | Some("false") | Some("FALSE") | Some("no") => false,
            Some(other) => {
                anyhow::bail!("SMS_STRICT_PHONE_VALIDATION must be true or false, got '{}'", other)
            }
        };

        let upstream_timeout = read("UPSTREAM_TIMEOUT_SECS")
            .map(|secs| {
                secs.parse::<u64>()
                    .map(Duration::from_secs)
                    .map_err(|_| anyhow::anyhow!("UPSTREAM_TIMEOUT_SECS must be a whole number of seconds"))
            })
            .transpose()?;

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitConfig {
            per_second: read("RATE_LIMIT_PER_SECOND")
                .map(|v| v.parse::<u64>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_PER_SECOND must be a positive number"))?
                .unwrap_or(defaults.per_second),
            burst: read("RATE_LIMIT_BURST")
                .map(|v| v.parse::<u32>())
                .transpose()
                .map_err(|_| anyhow::anyhow!("RATE_LIMIT_BURST must be a positive number"))?
                .unwrap_or(defaults.burst),
        };
        if rate_limit.replenish_period().is_none() || rate_limit.burst == 0 {
            anyhow::bail!(
                "RATE_LIMIT_PER_SECOND must be between 1 and 1000000000 and RATE_LIMIT_BURST greater than zero"
            );
        }

        let auth_scheme = read("CPFHUB_AUTH_SCHEME")
            .map(|v| v.parse::<CpfAuthScheme>())
            .transpose()?
            .unwrap_or(CpfAuthScheme::Bearer);
        let endpoint_style = read("CPFHUB_ENDPOINT_STYLE")
            .map(|v| v.parse::<CpfEndpointStyle>())
            .transpose()?
            .unwrap_or(CpfEndpointStyle::Path);

        let mut missing = Vec::new();
        let cpf_base_url = required_url(&read, "CPFHUB_BASE_URL", &mut missing);
        let cpf_token = required(&read, "CPFHUB_TOKEN", &mut missing);
        let cpf_provider = match (cpf_base_url, cpf_token) {
            (Some(base_url), Some(token)) => Credentials::Configured(CpfProviderConfig {
                base_url,
                token,
                auth_scheme,
                endpoint_style,
            }),
            _ => Credentials::Missing(missing),
        };

        let mut missing = Vec::new();
        let account_sid = required(&read, "TWILIO_ACCOUNT_SID", &mut missing);
        let auth_token = required(&read, "TWILIO_AUTH_TOKEN", &mut missing);
        let service_sid = required(&read, "TWILIO_VERIFY_SERVICE_SID", &mut missing);
        let otp_base_url = match read("TWILIO_VERIFY_BASE_URL") {
            None => Some(DEFAULT_TWILIO_VERIFY_BASE_URL.to_string()),
            Some(_) => required_url(&read, "TWILIO_VERIFY_BASE_URL", &mut missing),
        };
        let otp_provider = match (account_sid, auth_token, service_sid, otp_base_url) {
            (Some(account_sid), Some(auth_token), Some(service_sid), Some(base_url)) => {
                Credentials::Configured(OtpProviderConfig {
                    base_url,
                    account_sid,
                    auth_token,
                    service_sid,
                })
            }
            _ => Credentials::Missing(missing),
        };

        let config = Self {
            port,
            cpf_provider,
            otp_provider,
            phone_policy: PhonePolicy {
                country_code,
                strict,
            },
            upstream_timeout,
            rate_limit,
        };

        // Log configuration state (without sensitive values)
        match &config.cpf_provider {
            Credentials::Configured(cpf) => {
                tracing::debug!("CPF provider: {} ({:?}, {:?})", cpf.base_url, cpf.auth_scheme, cpf.endpoint_style)
            }
            Credentials::Missing(names) => tracing::warn!(
                "CPF provider not configured, /cpf will answer 500. Missing: {}",
                names.join(", ")
            ),
        }
        match &config.otp_provider {
            Credentials::Configured(otp) => tracing::debug!("OTP provider: {}", otp.base_url),
            Credentials::Missing(names) => tracing::warn!(
                "OTP provider not configured, /sms will answer 500. Missing: {}",
                names.join(", ")
            ),
        }
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn required<R>(read: &R, key: &str, missing: &mut Vec<String>) -> Option<String>
where
    R: Fn(&str) -> Option<String>,
{
    let value = read(key);
    if value.is_none() {
        missing.push(key.to_string());
    }
    value
}

fn required_url<R>(read: &R, key: &str, missing: &mut Vec<String>) -> Option<String>
where
    R: Fn(&str) -> Option<String>,
{
    match read(key) {
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Some(url.trim_end_matches('/').to_string())
        }
        Some(_) => {
            missing.push(format!("{} (must start with http:// or https://)", key));
            None
        }
        None => {
            missing.push(key.to_string());
            None
        }
    }
}
