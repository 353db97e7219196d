use axum::http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::errors::GatewayError;

/// Field holding the body text when an upstream answer is not JSON.
pub const RAW_BODY_FIELD: &str = "raw";

// ============ Upstream ============

/// Status and body of a single upstream call.
///
/// Non-2xx answers are ordinary values; only transport failures are errors.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUpstreamResponse {
    pub status: StatusCode,
    /// Parsed JSON, or `{"raw": <text>}` when the body is not JSON.
    pub body: Value,
    /// Set when `body` is the text fallback rather than upstream JSON.
    pub text_fallback: bool,
}

impl RawUpstreamResponse {
    /// Builds a response from the status and body text, parsing JSON best-effort.
    pub fn from_parts(status: StatusCode, text: &str) -> Self {
        match serde_json::from_str::<Value>(text) {
            Ok(body) => Self {
                status,
                body,
                text_fallback: false,
            },
            Err(_) => {
                let mut fallback = serde_json::Map::new();
                fallback.insert(RAW_BODY_FIELD.to_string(), Value::String(text.to_string()));
                Self {
                    status,
                    body: Value::Object(fallback),
                    text_fallback: true,
                }
            }
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Whether the body was kept as raw text.
    pub fn is_raw(&self) -> bool {
        self.text_fallback
    }

    /// Message to hand back to the caller on failure.
    ///
    /// Precedence: `error`, then `message`, then the raw text, then the whole body.
    pub fn error_message(&self) -> Value {
        if let Some(error) = self.body.get("error").filter(|v| !v.is_null()) {
            return error.clone();
        }
        if let Some(message) = self.body.get("message").filter(|v| !v.is_null()) {
            return message.clone();
        }
        if let Some(raw) = self.body.get(RAW_BODY_FIELD).filter(|_| self.is_raw()) {
            return raw.clone();
        }
        self.body.clone()
    }

    /// Passes 2xx responses through and turns anything else into [`GatewayError::Upstream`].
    pub fn into_success(self, provider: &'static str) -> Result<Self, GatewayError> {
        if self.is_success() {
            return Ok(self);
        }
        let message = self.error_message();
        let details = if self.is_raw() { None } else { Some(self.body) };
        Err(GatewayError::Upstream {
            provider,
            status: self.status,
            message,
            details,
        })
    }
}

// ============ Normalized results ============

/// Stable output of a CPF lookup. Absent fields are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupResult {
    pub name: String,
    pub birth_date: String,
}

/// Stable output of a verification step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
}

/// Where the lookup name may live, first match wins.
const NAME_FIELDS: &[&[&str]] = &[&["data", "name"], &["nome"]];

/// Where the birth date may live, first match wins.
const BIRTH_DATE_FIELDS: &[&[&str]] = &[
    &["data", "birthDate"],
    &["data_nascimento"],
    &["nascimento"],
];

/// First string found along the given paths. Null and non-string values are skipped.
fn first_string(body: &Value, paths: &[&[&str]]) -> Option<String> {
    paths.iter().find_map(|path| {
        path.iter()
            .try_fold(body, |node, key| node.get(*key))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

/// Maps any known CPF provider shape onto [`LookupResult`].
pub fn normalize_lookup(body: &Value) -> LookupResult {
    LookupResult {
        name: first_string(body, NAME_FIELDS).unwrap_or_default(),
        birth_date: first_string(body, BIRTH_DATE_FIELDS).unwrap_or_default(),
    }
}

/// Reads `status` and `sid` from a verification start answer.
pub fn normalize_verification_start(body: &Value) -> VerificationResult {
    VerificationResult {
        status: first_string(body, &[&["status"]]).unwrap_or_default(),
        valid: None,
        sid: first_string(body, &[&["sid"]]),
    }
}

/// Reads `status` from a verification check answer; `approved` means valid.
pub fn normalize_verification_check(body: &Value) -> VerificationResult {
    let status = first_string(body, &[&["status"]]).unwrap_or_default();
    VerificationResult {
        valid: Some(status == "approved"),
        status,
        sid: None,
    }
}

// ============ Response envelopes ============

/// `{success:true, data:...}`
#[derive(Debug, Serialize)]
pub struct DataEnvelope<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

/// Success body of the SMS endpoints; the result fields sit at top level.
#[derive(Debug, Serialize)]
pub struct SmsResponse {
    pub success: bool,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub to: String,
    #[serde(flatten)]
    pub result: VerificationResult,
}

impl SmsResponse {
    pub fn new(kind: &'static str, to: String, result: VerificationResult) -> Self {
        Self {
            success: true,
            kind,
            to,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lookup_nested_data() {
        let body = json!({"data": {"name": "A", "birthDate": "B"}});
        assert_eq!(
            normalize_lookup(&body),
            LookupResult {
                name: "A".into(),
                birth_date: "B".into()
            }
        );
    }

    #[test]
    fn test_lookup_flat_portuguese_fields() {
        let body = json!({"nome": "A"});
        assert_eq!(
            normalize_lookup(&body),
            LookupResult {
                name: "A".into(),
                birth_date: "".into()
            }
        );

        let body = json!({"nome": "A", "nascimento": "01/01/1990"});
        assert_eq!(normalize_lookup(&body).birth_date, "01/01/1990");
    }

    #[test]
    fn test_lookup_precedence() {
        let body = json!({
            "data": {"name": "Nested", "birthDate": null},
            "nome": "Flat",
            "data_nascimento": "1990-01-01",
            "nascimento": "01/01/1990"
        });
        let result = normalize_lookup(&body);
        assert_eq!(result.name, "Nested");
        assert_eq!(result.birth_date, "1990-01-01");
    }

    #[test]
    fn test_lookup_empty_and_non_object() {
        assert_eq!(normalize_lookup(&json!({})), LookupResult::default());
        assert_eq!(normalize_lookup(&json!("text")), LookupResult::default());
        assert_eq!(normalize_lookup(&json!({"data": "x"})), LookupResult::default());
    }

    #[test]
    fn test_lookup_serializes_camel_case() {
        let value = serde_json::to_value(LookupResult {
            name: "A".into(),
            birth_date: "B".into(),
        })
        .unwrap();
        assert_eq!(value, json!({"name": "A", "birthDate": "B"}));
    }

    #[test]
    fn test_verification_check_approval() {
        let approved = normalize_verification_check(&json!({"status": "approved"}));
        assert_eq!(approved.valid, Some(true));

        let pending = normalize_verification_check(&json!({"status": "pending"}));
        assert_eq!(pending.valid, Some(false));

        let missing = normalize_verification_check(&json!({}));
        assert_eq!(missing.status, "");
        assert_eq!(missing.valid, Some(false));
    }

    #[test]
    fn test_verification_start_fields() {
        let result = normalize_verification_start(&json!({"status": "pending", "sid": "VE1"}));
        assert_eq!(result.status, "pending");
        assert_eq!(result.sid.as_deref(), Some("VE1"));
        assert_eq!(result.valid, None);
    }

    #[test]
    fn test_sms_response_flattens_result() {
        let response = SmsResponse::new(
            "start",
            "+5511999999999".into(),
            normalize_verification_start(&json!({"status": "pending", "sid": "X"})),
        );
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "success": true,
                "type": "start",
                "to": "+5511999999999",
                "status": "pending",
                "sid": "X"
            })
        );
    }

    #[test]
    fn test_raw_body_fallback() {
        let response = RawUpstreamResponse::from_parts(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert!(response.is_raw());
        assert_eq!(response.error_message(), json!("<html>oops</html>"));

        let err = response.into_success("cpfhub").unwrap_err();
        match err {
            GatewayError::Upstream { details, status, .. } => {
                assert_eq!(status, StatusCode::BAD_GATEWAY);
                assert!(details.is_none());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_json_body_shaped_like_fallback_keeps_details() {
        let body = r#"{"raw": "quota exceeded"}"#;
        let response = RawUpstreamResponse::from_parts(StatusCode::TOO_MANY_REQUESTS, body);
        assert!(!response.is_raw());
        assert_eq!(response.error_message(), json!({"raw": "quota exceeded"}));

        match response.into_success("cpfhub").unwrap_err() {
            GatewayError::Upstream { details, .. } => {
                assert_eq!(details, Some(json!({"raw": "quota exceeded"})));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_message_precedence() {
        let body = r#"{"error": "limite", "message": "Too many requests"}"#;
        let response = RawUpstreamResponse::from_parts(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(response.error_message(), json!("limite"));

        let body = r#"{"code": 60203, "message": "Max send attempts reached"}"#;
        let response = RawUpstreamResponse::from_parts(StatusCode::TOO_MANY_REQUESTS, body);
        assert_eq!(response.error_message(), json!("Max send attempts reached"));

        let body = r#"{"code": 1}"#;
        let response = RawUpstreamResponse::from_parts(StatusCode::BAD_REQUEST, body);
        assert_eq!(response.error_message(), json!({"code": 1}));
    }

    #[test]
    fn test_success_passes_through() {
        let response = RawUpstreamResponse::from_parts(StatusCode::OK, r#"{"nome":"A"}"#);
        let response = response.into_success("cpfhub").unwrap();
        assert_eq!(response.body, json!({"nome": "A"}));
    }
}
