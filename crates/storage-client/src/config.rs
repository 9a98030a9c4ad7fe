use std::time::Duration;

pub const DEFAULT_CHECK_PATH: &str = "/file/chunk/check";
pub const DEFAULT_UPLOAD_PATH: &str = "/file/chunk/upload";
pub const DEFAULT_MERGE_PATH: &str = "/file/chunk/merge";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Where and how to reach the storage endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Scheme, host and optional prefix, e.g. `https://api.example.com/v1`.
    pub base_url: String,
    pub check_path: String,
    pub upload_path: String,
    pub merge_path: String,
    /// Sent as `Authorization: Bearer <token>` when set.
    pub token: Option<String>,
    /// Per-request deadline.
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            check_path: DEFAULT_CHECK_PATH.into(),
            upload_path: DEFAULT_UPLOAD_PATH.into(),
            merge_path: DEFAULT_MERGE_PATH.into(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Joins `path` onto the base URL with exactly one slash between them.
    pub fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}
