use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Authentication failed ({kind}): {message}")]
    Authentication { kind: String, message: String },

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Identity provider error ({kind}): {message}")]
    Identity { kind: String, message: String },

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Identity error types that mean the credentials, code or token were rejected.
const AUTHENTICATION_ERROR_TYPES: &[&str] = &[
    "NotAuthorizedException",
    "CodeMismatchException",
    "ExpiredCodeException",
    "UserNotFoundException",
    "UserNotConfirmedException",
    "PasswordResetRequiredException",
];

/// Error envelope returned by the identity endpoint.
#[derive(Debug, Deserialize)]
struct IdentityErrorBody {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Map a failed identity call. The `__type` field wins over the status code.
    pub fn from_identity_response(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed = match serde_json::from_str::<IdentityErrorBody>(body) {
            Ok(parsed) if !parsed.kind.is_empty() => parsed,
            _ => return Self::from_status(status, body),
        };

        // "com.amazonaws...#NotAuthorizedException" -> "NotAuthorizedException"
        let kind = parsed
            .kind
            .rsplit('#')
            .next()
            .unwrap_or(&parsed.kind)
            .to_string();
        let message = parsed.message.unwrap_or_else(|| "no message".to_string());

        if AUTHENTICATION_ERROR_TYPES.contains(&kind.as_str()) {
            ApiError::Authentication { kind, message }
        } else if kind == "TooManyRequestsException" || kind == "LimitExceededException" {
            ApiError::RateLimited
        } else {
            ApiError::Identity { kind, message }
        }
    }

    pub fn unexpected(what: &str, body: &str) -> Self {
        ApiError::UnexpectedResponse(format!("{}: {}", what, Self::truncate_body(body)))
    }

    /// Connection refused, DNS failure, timeout and similar.
    pub fn is_transport(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }

    /// Rejected credentials, codes or tokens. Retrying the same call will not help.
    pub fn is_authentication(&self) -> bool {
        matches!(self, ApiError::Authentication { .. } | ApiError::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status() {
        assert!(matches!(ApiError::from_status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(StatusCode::NOT_FOUND, "x"), ApiError::NotFound(_)));
        assert!(matches!(
            ApiError::from_status(StatusCode::BAD_GATEWAY, "x"),
            ApiError::ServerError(_)
        ));
        assert!(matches!(
            ApiError::from_status(StatusCode::IM_A_TEAPOT, "x"),
            ApiError::InvalidResponse(_)
        ));
    }

    #[test]
    fn test_identity_error_authentication() {
        let body = r#"{"__type":"NotAuthorizedException","message":"Refresh Token has expired"}"#;
        let err = ApiError::from_identity_response(StatusCode::BAD_REQUEST, body);
        assert!(err.is_authentication());
        assert!(!err.is_transport());
        assert_eq!(
            err.to_string(),
            "Authentication failed (NotAuthorizedException): Refresh Token has expired"
        );
    }

    #[test]
    fn test_identity_error_namespaced_type() {
        let body = r#"{"__type":"com.amazonaws.cognito#CodeMismatchException","message":"Invalid code"}"#;
        match ApiError::from_identity_response(StatusCode::BAD_REQUEST, body) {
            ApiError::Authentication { kind, .. } => assert_eq!(kind, "CodeMismatchException"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_identity_error_other_type() {
        let body = r#"{"__type":"InvalidParameterException","message":"bad"}"#;
        let err = ApiError::from_identity_response(StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, ApiError::Identity { .. }));
        assert!(!err.is_authentication());
    }

    #[test]
    fn test_identity_error_falls_back_to_status() {
        let err = ApiError::from_identity_response(StatusCode::SERVICE_UNAVAILABLE, "<html>");
        assert!(matches!(err, ApiError::ServerError(_)));
    }

    #[test]
    fn test_truncate_body() {
        let long = "a".repeat(600);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.starts_with(&"a".repeat(500)));
        assert!(truncated.ends_with("(truncated, 600 total bytes)"));
        assert_eq!(ApiError::truncate_body("short"), "short");
    }
}
