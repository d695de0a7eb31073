use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything the DashScope client can fail with.
#[derive(Debug, Error)]
pub enum Error {
    /// Local validation failed, nothing was sent.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The task reached the FAILED state. `reason` is the server's message, verbatim.
    #[error("Task {task_id} failed: {reason}")]
    RemoteFailure { task_id: String, reason: String },

    #[error("Task {task_id} still unfinished after {}s", elapsed.as_secs())]
    Timeout { task_id: String, elapsed: Duration },

    /// A 2xx response lacked a field we rely on, or wasn't the JSON we expected.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Missing credential: the {0} environment variable is not set")]
    MissingCredential(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(TransportError::Request(err))
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("DashScope returned {status}: {error}")]
    Status {
        status: StatusCode,
        error: ApiError,
        request_id: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
    request_id: Option<String>,
}

impl TransportError {
    /// Builds the error for a non-2xx response. DashScope usually sends
    /// `{code, message, request_id}`, but gateways in front of it don't.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        match serde_json::from_str::<ErrorBody>(body) {
            Ok(ErrorBody {
                code,
                message,
                request_id,
            }) => Self::Status {
                status,
                error: ApiError::from_code(&code, message),
                request_id,
            },
            Err(_) => Self::Status {
                status,
                error: ApiError::Unexpected {
                    code: String::new(),
                    message: body.to_string(),
                },
                request_id: None,
            },
        }
    }
}

/// Error codes documented for the DashScope API
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Invalid API key: {message}")]
    InvalidApiKey { message: String },

    #[error("Access denied: {message}")]
    AccessDenied { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Content inspection failed: {message}")]
    DataInspectionFailed { message: String },

    #[error("Account in arrears: {message}")]
    Arrearage { message: String },

    #[error("Rate limit exceeded: {message}")]
    Throttling { message: String },

    #[error("Internal platform error: {message}")]
    Internal { message: String },

    /// Catch-all for codes we don't know
    #[error("Unexpected API error {code}: {message}")]
    Unexpected { code: String, message: String },
}

impl ApiError {
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        let message = message.into();

        match code {
            "InvalidParameter" | "InvalidURL" | "InvalidFile" => Self::InvalidParameter { message },
            "InvalidApiKey" => Self::InvalidApiKey { message },
            "AccessDenied" | "AccessDenied.Unpurchased" => Self::AccessDenied { message },
            "ModelNotFound" | "NotFound" => Self::NotFound { message },
            "DataInspectionFailed" => Self::DataInspectionFailed { message },
            "Arrearage" => Self::Arrearage { message },
            c if c.starts_with("Throttling") => Self::Throttling { message },
            "InternalError" | "SystemError" => Self::Internal { message },
            other => Self::Unexpected {
                code: other.to_string(),
                message,
            },
        }
    }
}

/// Returns `InvalidArgument` from the enclosing function unless `$cond` holds.
macro_rules! ensure_arg {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::Error::InvalidArgument(format!($($arg)+)));
        }
    };
}
pub(crate) use ensure_arg;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decodes_dashscope_error_body() {
        let err = TransportError::from_response(
            StatusCode::UNAUTHORIZED,
            r#"{"code":"InvalidApiKey","message":"Invalid API-key provided.","request_id":"r-1"}"#,
        );

        let TransportError::Status {
            status,
            error,
            request_id,
        } = err
        else {
            panic!("expected a status error");
        };
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            error,
            ApiError::InvalidApiKey {
                message: "Invalid API-key provided.".into()
            }
        );
        assert_eq!(request_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn throttling_subcodes_are_grouped() {
        assert_eq!(
            ApiError::from_code("Throttling.RateQuota", "slow down"),
            ApiError::Throttling {
                message: "slow down".into()
            }
        );
    }

    #[test]
    fn non_json_body_is_kept_verbatim() {
        let err = TransportError::from_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert_eq!(
            err.to_string(),
            "DashScope returned 502 Bad Gateway: Unexpected API error : <html>bad gateway</html>"
        );
    }
}
