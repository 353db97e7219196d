//! Input normalization for the CPF and SMS endpoints.
//!
//! Pure functions: raw query/body values in, canonical request values out.

use crate::errors::GatewayError;
use phonenumber::Mode;
use serde::{Deserialize, Deserializer};

/// Number of digits in a CPF.
pub const CPF_LENGTH: usize = 11;

/// Country code prepended to phones that arrive without one (Brazil).
pub const DEFAULT_COUNTRY_CODE: &str = "55";

/// Query parameters accepted by `/cpf`.
#[derive(Debug, Default, Deserialize)]
pub struct CpfParams {
    pub cpf: Option<String>,
}

/// Parameters accepted by `/sms` and `/sms-start`, from query or body.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SmsParams {
    pub step: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub phone: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub code: Option<String>,
}

/// JSON clients often send phones and OTP codes as bare numbers.
fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Number(u64),
    }

    Ok(Option::<Scalar>::deserialize(deserializer)?.map(|scalar| match scalar {
        Scalar::Text(text) => text,
        Scalar::Number(number) => number.to_string(),
    }))
}

impl SmsParams {
    /// Overlays `other` on top of `self`; values present in `other` win.
    pub fn merge(self, other: SmsParams) -> SmsParams {
        SmsParams {
            step: other.step.or(self.step),
            phone: other.phone.or(self.phone),
            code: other.code.or(self.code),
        }
    }
}

/// How phones without a leading `+` are completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonePolicy {
    /// Digits only, no `+`.
    pub country_code: String,
    /// Also require the result to be a dialable number per libphonenumber metadata.
    pub strict: bool,
}

impl Default for PhonePolicy {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            strict: false,
        }
    }
}

/// A validated CPF lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupRequest {
    /// Exactly 11 ASCII digits.
    pub cpf: String,
}

impl LookupRequest {
    pub fn parse(raw: Option<&str>) -> Result<Self, GatewayError> {
        let cpf = normalize_cpf(raw.unwrap_or_default())?;
        Ok(Self { cpf })
    }
}

/// Which verification call to make. A check always carries its code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationStep {
    Start,
    Check { code: String },
}

impl VerificationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStep::Start => "start",
            VerificationStep::Check { .. } => "check",
        }
    }
}

/// A validated SMS verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationRequest {
    /// E.164: `+` followed by digits only.
    pub phone: String,
    pub step: VerificationStep,
}

impl VerificationRequest {
    /// Validates in the order phone, step, code.
    pub fn parse(params: SmsParams, policy: &PhonePolicy) -> Result<Self, GatewayError> {
        let phone = non_blank(params.phone)
            .ok_or_else(|| GatewayError::Validation("Parâmetro 'phone' é obrigatório".into()))?;
        let phone = normalize_phone_with_country(&phone, &policy.country_code)?;
        if policy.strict {
            ensure_dialable(&phone)?;
        }

        let step = match non_blank(params.step).as_deref() {
            Some("start") => VerificationStep::Start,
            Some("check") => {
                let code = non_blank(params.code).ok_or_else(|| {
                    GatewayError::Validation("Parâmetro 'code' é obrigatório".into())
                })?;
                VerificationStep::Check { code }
            }
            _ => return Err(GatewayError::Validation("Parâmetro 'step' inválido".into())),
        };

        Ok(Self { phone, step })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Strips every non-digit; the result must be exactly 11 digits.
pub fn normalize_cpf(raw: &str) -> Result<String, GatewayError> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() != CPF_LENGTH {
        return Err(GatewayError::Validation("CPF inválido".into()));
    }
    Ok(digits)
}

/// [`normalize_phone_with_country`] with the Brazilian default.
pub fn normalize_phone(raw: &str) -> Result<String, GatewayError> {
    normalize_phone_with_country(raw, DEFAULT_COUNTRY_CODE)
}

/// Normalizes a phone to E.164.
///
/// - `+` first (after dropping punctuation): kept, digits only after it.
/// - digits starting with `country_code`: `+` prepended.
/// - anything else: `+` and `country_code` prepended.
///
/// A local number whose area code equals the country code (DDD 55 in Brazil)
/// is indistinguishable from one carrying the country code and is taken as
/// the latter. Callers that need certainty must send the `+`.
pub fn normalize_phone_with_country(raw: &str, country_code: &str) -> Result<String, GatewayError> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit()).collect();

    if digits.is_empty() {
        return Err(GatewayError::Validation("Parâmetro 'phone' inválido".into()));
    }

    let e164 = if cleaned.starts_with('+') || digits.starts_with(country_code) {
        format!("+{}", digits)
    } else {
        format!("+{}{}", country_code, digits)
    };
    Ok(e164)
}

/// Rejects E.164 strings libphonenumber does not consider valid numbers.
pub fn ensure_dialable(e164: &str) -> Result<(), GatewayError> {
    match phonenumber::parse(None, e164) {
        Ok(number) if phonenumber::is_valid(&number) => {
            tracing::debug!(
                "Dialable phone: {}",
                crate::obs::mask(&number.format().mode(Mode::E164).to_string(), 4)
            );
            Ok(())
        }
        Ok(_) => {
            tracing::warn!("Rejecting non-dialable phone {}", crate::obs::mask(e164, 4));
            Err(GatewayError::Validation("Parâmetro 'phone' inválido".into()))
        }
        Err(e) => {
            tracing::warn!("Failed to parse phone {}: {:?}", crate::obs::mask(e164, 4), e);
            Err(GatewayError::Validation("Parâmetro 'phone' inválido".into()))
        }
    }
}
