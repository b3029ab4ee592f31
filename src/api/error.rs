use thiserror::Error;

/// Failure of one delivery attempt. Never fatal to a drain: the
/// orchestrator records the failure against the single affected action and
/// moves on.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("unknown resource kind: {0}")]
    UnknownResource(String),

    #[error("{kind} {resource} action has no target id in payload")]
    MissingTargetId { kind: String, resource: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            format!(
                "{}... (truncated, {} total bytes)",
                &body[..MAX_ERROR_BODY_LENGTH],
                body.len()
            )
        }
    }

    /// Build an error from a non-2xx response. Failure bodies may carry a
    /// human-readable `message` field; when absent or unparsable the HTTP
    /// status text stands in.
    pub fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.get("message")
                    .and_then(|m| m.as_str())
                    .map(|m| Self::truncate_body(m))
            })
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });

        ApiError::Http {
            status: status.as_u16(),
            message,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
