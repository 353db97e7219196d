use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::fmt;

/// Gateway error taxonomy.
///
/// Every variant is rendered as the `{success:false, error:...}` envelope by
/// [`IntoResponse`]; nothing escapes the handler boundary as a platform fault.
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Malformed or missing input parameter (client fault).
    Validation(String),
    /// Required provider configuration is missing. Holds the offending names.
    Configuration(Vec<String>),
    /// The provider answered with a non-2xx status.
    Upstream {
        /// Provider name, for logs.
        provider: &'static str,
        /// Status forwarded verbatim to the caller.
        status: StatusCode,
        /// Upstream message, or the raw body when nothing better was found.
        message: Value,
        /// Parsed upstream body, when it was JSON.
        details: Option<Value>,
    },
    /// The provider could not be reached or its body could not be read.
    Transport {
        /// Provider name, for logs and the response message.
        provider: &'static str,
        /// Underlying failure. Logged, never sent to the caller.
        detail: String,
    },
    /// Unexpected failure inside the gateway itself.
    Internal(String),
    /// Request refused by the HTTP stack before reaching a handler
    /// (unknown route, wrong method, body too large, rate limited).
    Rejected {
        status: StatusCode,
        message: String,
    },
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<GatewayError>,
        /// Additional context message.
        context: String,
    },
}

impl GatewayError {
    /// HTTP status this error is answered with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Upstream { status, .. } => *status,
            GatewayError::Transport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Rejected { status, .. } => *status,
            GatewayError::WithContext { source, .. } => source.status_code(),
        }
    }

    /// Envelope-friendly error for a status produced outside the handlers.
    pub fn rejected(status: StatusCode) -> Self {
        let message = match status {
            StatusCode::NOT_FOUND => "Rota não encontrada".to_string(),
            StatusCode::METHOD_NOT_ALLOWED => "Método não permitido".to_string(),
            StatusCode::PAYLOAD_TOO_LARGE => "Corpo da requisição muito grande".to_string(),
            StatusCode::TOO_MANY_REQUESTS => {
                "Muitas requisições, tente novamente mais tarde".to_string()
            }
            other => other
                .canonical_reason()
                .unwrap_or("Erro na requisição")
                .to_string(),
        };
        GatewayError::Rejected { status, message }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayError::Validation(msg) => write!(f, "{}", msg),
            GatewayError::Configuration(names) => {
                write!(f, "Configuração ausente: {}", names.join(", "))
            }
            GatewayError::Upstream {
                provider,
                status,
                message,
                ..
            } => match message {
                Value::String(text) => write!(f, "{} returned {}: {}", provider, status, text),
                other => write!(f, "{} returned {}: {}", provider, status, other),
            },
            GatewayError::Transport { provider, detail } => {
                write!(f, "{} unreachable: {}", provider, detail)
            }
            GatewayError::Internal(msg) => write!(f, "Internal error: {}", msg),
            GatewayError::Rejected { message, .. } => write!(f, "{}", message),
            GatewayError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for GatewayError {}

impl IntoResponse for GatewayError {
    /// Converts the error into the JSON failure envelope.
    ///
    /// Client faults are logged at warn level, everything else at error.
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match self {
            GatewayError::Validation(msg) => {
                tracing::warn!("Rejected request: {}", msg);
                json!({ "success": false, "error": msg })
            }
            GatewayError::Configuration(names) => {
                let missing = names.join(", ");
                tracing::error!("Provider not configured, missing: {}", missing);
                json!({
                    "success": false,
                    "error": format!("Configuração ausente: {}", missing),
                })
            }
            GatewayError::Upstream {
                provider,
                status,
                message,
                details,
            } => {
                tracing::warn!("{} answered {}, forwarding status", provider, status);
                let mut body = json!({ "success": false, "error": message });
                if let Some(details) = details {
                    body["details"] = details;
                }
                body
            }
            GatewayError::Transport { provider, detail } => {
                tracing::error!("{} transport failure: {}", provider, detail);
                json!({
                    "success": false,
                    "error": format!("Falha de comunicação com o provedor {}", provider),
                })
            }
            GatewayError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                json!({ "success": false, "error": "Erro interno" })
            }
            GatewayError::Rejected { status, message } => {
                tracing::warn!("Request refused with {}", status);
                json!({ "success": false, "error": message })
            }
            GatewayError::WithContext { source, context } => {
                tracing::debug!("Error context: {}", context);
                return (*source).into_response();
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `GatewayError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, GatewayError>;
}

impl<T> ResultExt<T> for Result<T, GatewayError> {
    fn context(self, context: impl Into<String>) -> Result<T, GatewayError> {
        self.map_err(|e| GatewayError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}
