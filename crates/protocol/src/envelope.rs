use serde::{Deserialize, Serialize};

/// Codes the backend uses for a successful call.
pub const SUCCESS_CODES: [i32; 2] = [0, 200];

/// Error reported by the backend inside a response envelope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("backend error {code}: {message}")]
pub struct ApiError {
    pub code: i32,
    pub message: String,
}

/// Envelope wrapping every backend response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i32,
    #[serde(default, alias = "message")]
    pub msg: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// Creates a successful envelope around `data`.
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            msg: String::new(),
            data: Some(data),
        }
    }

    /// Returns `true` if `code` signals success.
    pub fn is_success(&self) -> bool {
        SUCCESS_CODES.contains(&self.code)
    }

    /// Unwraps the envelope, turning a failure code into an [`ApiError`].
    pub fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.is_success() {
            Ok(self.data)
        } else {
            Err(ApiError {
                code: self.code,
                message: self.msg,
            })
        }
    }
}
