//! Custom error types for buddy-bot with fatal / recoverable classification.

use thiserror::Error;

/// Main error type for buddy-bot operations.
#[derive(Error, Debug)]
pub enum BuddyError {
    // Cli args errors
    #[error("Invalid arguments: {0}")]
    InvalidArgs(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Repository not configured: {0}")]
    MissingRepository(String),

    #[error(
        "Access token not found: set --github-token or the GITHUB_TOKEN environment variable"
    )]
    MissingToken,

    // Forge/Git errors
    #[error("Forge operation failed: {0}")]
    ForgeError(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid git remote URL: {0}")]
    InvalidRemoteUrl(String),

    #[error("Git URL parse error: {0}")]
    GitUrlError(#[from] git_url_parse::GitUrlParseError),

    #[error("Git operation failed: {0}")]
    GitError(#[from] git2::Error),

    // Network/API errors
    #[error("Network request failed: {0}")]
    NetworkError(String),

    #[error("API authentication failed: {0}")]
    AuthenticationError(String),

    #[error("API rate limit exceeded")]
    RateLimitExceeded,

    /// The remote understood the request and refused it; retrying will not
    /// help.
    #[error("Request rejected: {0}")]
    RequestRejected(String),

    // Parsing errors - automatic conversions via #[from]
    #[error("TOML edit error: {0}")]
    TomlEditError(#[from] toml_edit::TomlError),

    #[error("JSON parse error: {0}")]
    JsonParseError(#[from] serde_json::Error),

    #[error("Regular expression error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    GlobError(#[from] globset::Error),

    #[error("Directory walk error: {0}")]
    WalkError(#[from] walkdir::Error),

    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] log::SetLoggerError),

    // Generic wrapper for other errors
    #[error(transparent)]
    Other(#[from] color_eyre::Report),
}

/// Result type alias using BuddyError
pub type Result<T> = std::result::Result<T, BuddyError>;

impl BuddyError {
    /// Create a forge error with context
    pub fn forge(msg: impl Into<String>) -> Self {
        Self::ForgeError(msg.into())
    }

    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a permission denied error
    pub fn permission(msg: impl Into<String>) -> Self {
        Self::PermissionDenied(msg.into())
    }

    /// Fatal errors abort the run before any write happens. Everything else
    /// is scoped to a single group or branch.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingToken
                | Self::MissingRepository(_)
                | Self::InvalidArgs(_)
                | Self::InvalidConfig(_)
                | Self::AuthenticationError(_)
        )
    }

    /// Errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NetworkError(_) | Self::RateLimitExceeded)
    }

    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

impl From<std::io::Error> for BuddyError {
    fn from(err: std::io::Error) -> Self {
        Self::Other(color_eyre::Report::from(err))
    }
}

impl BuddyError {
    /// Maps an HTTP status to an error. Only 5xx responses are transient.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Self::AuthenticationError(message),
            403 => Self::PermissionDenied(message),
            429 => Self::RateLimitExceeded,
            500.. => Self::NetworkError(message),
            _ => Self::RequestRejected(message),
        }
    }
}

impl From<reqwest::Error> for BuddyError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), err.to_string());
        }

        if err.is_timeout() || err.is_connect() || err.is_request() {
            return Self::NetworkError(err.to_string());
        }

        Self::RequestRejected(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for BuddyError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::AuthenticationError(format!("Invalid header value: {}", err))
    }
}

impl From<octocrab::Error> for BuddyError {
    fn from(err: octocrab::Error) -> Self {
        match &err {
            octocrab::Error::GitHub { source, .. } => {
                let message = source.message.to_lowercase();
                let status = source.status_code.as_u16();

                if message.contains("rate limit") || status == 429 {
                    Self::RateLimitExceeded
                } else if status == 401 {
                    Self::AuthenticationError(source.message.clone())
                } else if message.contains("workflow")
                    || message.contains("resource not accessible")
                    || status == 403
                {
                    Self::PermissionDenied(source.message.clone())
                } else if status >= 500 {
                    Self::NetworkError(source.message.clone())
                } else {
                    Self::ForgeError(format!("GitHub API error: {}", err))
                }
            }
            octocrab::Error::Hyper { .. } | octocrab::Error::Service { .. } => {
                Self::NetworkError(err.to_string())
            }
            _ => Self::ForgeError(format!("GitHub API error: {}", err)),
        }
    }
}
