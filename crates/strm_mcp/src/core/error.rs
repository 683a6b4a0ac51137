use rmcp::ErrorData as McpError;
use serde_json::json;

// Error codes
const ERROR_VALIDATION: &str = "validation_error";
const ERROR_HOST_REJECTED: &str = "host_rejected";
const ERROR_HOST_HTTP: &str = "host_http_error";
const ERROR_HOST_TRANSPORT: &str = "host_transport_error";
const ERROR_DECODE: &str = "decode_error";
const ERROR_QR_EXPIRED: &str = "qr_expired";
const ERROR_QR_NO_SESSION: &str = "qr_no_session";
const ERROR_QR_IMAGE: &str = "qr_image_error";
const ERROR_RESOURCE_NOT_FOUND: &str = "resource_not_found";
const ERROR_CLIENT: &str = "client_error";
const ERROR_CONFIG: &str = "config_error";

/// Failures talking to the host plugin runtime
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Request to {path} failed: {message}")]
    Transport { path: String, message: String },
    #[error("HTTP error {status} for {path}")]
    Http { path: String, status: u16 },
    #[error("Invalid response from {path}: {message}")]
    Decode { path: String, message: String },
}

/// Failures decoding a raw path-list value
#[derive(Debug, thiserror::Error)]
pub enum PathListError {
    #[error("Path list is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
    #[error("Path list field {field} holds a {found} instead of a string")]
    NotAString { field: String, found: String },
}

/// Custom error types for better error handling
#[derive(Debug, thiserror::Error)]
pub enum StrmHelperError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },
    #[error("Host rejected {operation} (code {code}): {message}")]
    Rejected {
        operation: String,
        code: i64,
        message: String,
    },
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("QR login challenge expired, refresh to get a new code")]
    QrExpired,
    #[error("No completed QR login session: {reason}")]
    QrNoSession { reason: String },
    #[error("Failed to write QR code image to {path}: {message}")]
    QrImage { path: String, message: String },
    #[error("Resource not found: {uri}")]
    ResourceNotFound { uri: String },
    #[error("HTTP client error: {message}")]
    ClientError { message: String },
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
    /// Logging initialization failed
    #[error("Logging initialization failed: {0}")]
    LoggingInitialization(String),
}

impl StrmHelperError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<StrmHelperError> for McpError {
    fn from(err: StrmHelperError) -> Self {
        match err {
            StrmHelperError::Validation { field, message } => McpError::invalid_params(
                ERROR_VALIDATION,
                Some(json!({ "field": field, "message": message })),
            ),
            StrmHelperError::Rejected {
                operation,
                code,
                message,
            } => McpError::internal_error(
                ERROR_HOST_REJECTED,
                Some(json!({ "operation": operation, "code": code, "message": message })),
            ),
            StrmHelperError::Host(HostError::Http { path, status }) => McpError::internal_error(
                ERROR_HOST_HTTP,
                Some(json!({ "path": path, "status": status })),
            ),
            StrmHelperError::Host(HostError::Transport { path, message }) => {
                McpError::internal_error(
                    ERROR_HOST_TRANSPORT,
                    Some(json!({ "path": path, "message": message })),
                )
            }
            StrmHelperError::Host(HostError::Decode { path, message }) => McpError::internal_error(
                ERROR_DECODE,
                Some(json!({ "path": path, "message": message })),
            ),
            StrmHelperError::QrExpired => McpError::invalid_request(
                ERROR_QR_EXPIRED,
                Some(json!({ "hint": "call qr_login_refresh to request a new code" })),
            ),
            StrmHelperError::QrNoSession { reason } => {
                McpError::invalid_request(ERROR_QR_NO_SESSION, Some(json!({ "reason": reason })))
            }
            StrmHelperError::QrImage { path, message } => McpError::internal_error(
                ERROR_QR_IMAGE,
                Some(json!({ "path": path, "message": message })),
            ),
            StrmHelperError::ResourceNotFound { uri } => McpError::resource_not_found(
                ERROR_RESOURCE_NOT_FOUND,
                Some(json!({
                    "uri": uri,
                    "available_resources": crate::server::AVAILABLE_RESOURCES
                })),
            ),
            StrmHelperError::ClientError { message } => {
                McpError::internal_error(ERROR_CLIENT, Some(json!({ "message": message })))
            }
            StrmHelperError::InvalidConfig { message } => {
                McpError::invalid_params(ERROR_CONFIG, Some(json!({ "message": message })))
            }
            StrmHelperError::LoggingInitialization(message) => {
                McpError::internal_error(ERROR_CONFIG, Some(json!({ "message": message })))
            }
        }
    }
}

pub type HostResult<T> = Result<T, HostError>;
pub type StrmHelperResult<T> = Result<T, StrmHelperError>;
pub type McpResult<T> = Result<T, McpError>;
