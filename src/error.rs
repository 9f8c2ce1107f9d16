use serde::Deserialize;
use thiserror::Error;

/// Errors produced while talking to the Azure API Management control plane.
#[derive(Debug, Error)]
pub enum ApimError {
    /// A caller-supplied parameter failed local validation; no remote call
    /// was made.
    #[error("invalid {field}: {reason}")]
    InvalidParameter { field: &'static str, reason: String },

    /// Credential acquisition failed (service principal or developer chain).
    #[error("failed to acquire Azure credential token: {0}")]
    Credential(#[source] azure_core::Error),

    /// The HTTP request never produced an ARM response (DNS, TLS, timeout).
    #[error("transport error talking to Azure Resource Manager: {0}")]
    Transport(#[from] reqwest::Error),

    /// ARM answered 404 for the addressed entity.
    #[error("{kind} '{name}' was not found in the API Management service")]
    NotFound { kind: &'static str, name: String },

    /// ARM answered with a non-success status and (usually) a structured
    /// error body.
    #[error("Azure request failed with status {status} ({code}): {message}")]
    Arm {
        status: u16,
        code: String,
        message: String,
    },

    /// ARM answered 2xx but the body did not have the expected shape.
    #[error("unexpected Azure response shape: {0}")]
    Malformed(String),
}

/// Standard ARM error envelope: `{"error": {"code": "...", "message": "..."}}`.
#[derive(Debug, Deserialize)]
struct ArmErrorBody {
    error: Option<ArmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ArmErrorDetail {
    code: Option<String>,
    message: Option<String>,
}

impl ApimError {
    /// Map a non-success ARM response into a typed error.
    ///
    /// 404 becomes [`ApimError::NotFound`] so callers can give the entity
    /// kind and name back to the MCP client instead of a raw status line.
    pub fn from_arm_response(status: u16, body: &str, kind: &'static str, name: &str) -> Self {
        if status == 404 {
            return ApimError::NotFound {
                kind,
                name: name.to_string(),
            };
        }

        let (code, message) = match serde_json::from_str::<ArmErrorBody>(body) {
            Ok(ArmErrorBody {
                error: Some(detail),
            }) => (
                detail.code.unwrap_or_else(|| "Unknown".to_string()),
                detail
                    .message
                    .unwrap_or_else(|| "no error message returned".to_string()),
            ),
            // Some gateway-level failures (e.g. 502 from a front door) return
            // plain text or HTML; keep a truncated copy of whatever came back.
            _ => (
                "Unknown".to_string(),
                body.chars().take(500).collect::<String>(),
            ),
        };

        ApimError::Arm {
            status,
            code,
            message,
        }
    }

    /// Whether a retry with backoff can reasonably help.
    ///
    /// 5xx and 429 are transient on the ARM side; transport errors may be
    /// transient on ours. Every other 4xx is a terminal caller error.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApimError::Arm { status, .. } => *status == 429 || (500..600).contains(status),
            ApimError::Transport(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arm_error_body_is_parsed() {
        let body = r#"{"error":{"code":"ValidationError","message":"Invalid path."}}"#;
        let err = ApimError::from_arm_response(400, body, "api", "orders");
        match err {
            ApimError::Arm {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 400);
                assert_eq!(code, "ValidationError");
                assert_eq!(message, "Invalid path.");
            }
            other => panic!("expected Arm error, got {other:?}"),
        }
    }

    #[test]
    fn not_found_maps_to_dedicated_variant() {
        let err = ApimError::from_arm_response(404, "", "api", "orders");
        assert!(matches!(err, ApimError::NotFound { kind: "api", .. }));
        assert!(err.to_string().contains("orders"));
    }

    #[test]
    fn unparseable_body_is_truncated_into_message() {
        let body = "x".repeat(2_000);
        let err = ApimError::from_arm_response(502, &body, "api", "orders");
        match err {
            ApimError::Arm { message, .. } => assert_eq!(message.len(), 500),
            other => panic!("expected Arm error, got {other:?}"),
        }
    }

    #[test]
    fn retry_classification_follows_status_class() {
        let transient = ApimError::from_arm_response(503, "{}", "api", "a");
        let throttled = ApimError::from_arm_response(429, "{}", "api", "a");
        let terminal = ApimError::from_arm_response(400, "{}", "api", "a");
        let missing = ApimError::from_arm_response(404, "{}", "api", "a");

        assert!(transient.is_retryable());
        assert!(throttled.is_retryable());
        assert!(!terminal.is_retryable());
        assert!(!missing.is_retryable());
        assert!(!ApimError::InvalidParameter {
            field: "api_id",
            reason: "empty".into()
        }
        .is_retryable());
    }
}
