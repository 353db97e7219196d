/// Unit tests for the response normalizers
/// Covers the provider shapes seen in the wild and their precedence
use cpf_sms_gateway::models::{
    normalize_lookup, normalize_verification_check, normalize_verification_start, LookupResult,
    RawUpstreamResponse,
};
use serde_json::json;

#[cfg(test)]
mod lookup_tests {
    use super::*;

    #[test]
    fn test_nested_provider_shape() {
        let result = normalize_lookup(&json!({"data": {"name": "A", "birthDate": "B"}}));
        assert_eq!(
            result,
            LookupResult {
                name: "A".to_string(),
                birth_date: "B".to_string()
            }
        );
    }

    #[test]
    fn test_flat_provider_shape() {
        let result = normalize_lookup(&json!({"nome": "A"}));
        assert_eq!(result.name, "A");
        assert_eq!(result.birth_date, "");
    }

    #[test]
    fn test_empty_body() {
        assert_eq!(normalize_lookup(&json!({})), LookupResult::default());
    }

    #[test]
    fn test_nested_fields_win_over_flat() {
        let result = normalize_lookup(&json!({
            "data": {"name": "Nested", "birthDate": "2000-01-01"},
            "nome": "Flat",
            "nascimento": "01/01/1990"
        }));
        assert_eq!(result.name, "Nested");
        assert_eq!(result.birth_date, "2000-01-01");
    }

    #[test]
    fn test_non_string_fields_are_skipped() {
        let result = normalize_lookup(&json!({
            "data": {"name": 42},
            "nome": "Fallback",
            "data_nascimento": null,
            "nascimento": "01/01/1990"
        }));
        assert_eq!(result.name, "Fallback");
        assert_eq!(result.birth_date, "01/01/1990");
    }

    #[test]
    fn test_raw_text_body_yields_empty_result() {
        let upstream = RawUpstreamResponse::from_parts(
            axum::http::StatusCode::OK,
            "not json at all",
        );
        assert_eq!(normalize_lookup(&upstream.body), LookupResult::default());
    }
}

#[cfg(test)]
mod verification_tests {
    use super::*;

    #[test]
    fn test_start_reads_status_and_sid() {
        let result = normalize_verification_start(&json!({
            "sid": "VE123",
            "status": "pending",
            "channel": "sms"
        }));
        assert_eq!(result.status, "pending");
        assert_eq!(result.sid.as_deref(), Some("VE123"));
        assert!(result.valid.is_none());
    }

    #[test]
    fn test_check_only_approved_is_valid() {
        for (status, valid) in [
            ("approved", true),
            ("pending", false),
            ("canceled", false),
            ("Approved", false),
        ] {
            let result = normalize_verification_check(&json!({ "status": status }));
            assert_eq!(result.valid, Some(valid), "status {status}");
        }
    }
}
