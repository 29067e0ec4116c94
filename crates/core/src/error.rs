use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("pdf had no readable page text: {0}")]
    NoText(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("no pdf files found in {0}")]
    NoDocuments(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("{service} returned status {status}: {details}")]
    Status {
        service: String,
        status: u16,
        details: String,
    },

    #[error("invalid response from {service}: {details}")]
    MalformedResponse { service: String, details: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),
}

impl ServiceError {
    /// Timeouts, dropped connections, rate limiting and server-side failures.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(error) => error.is_timeout() || error.is_connect(),
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid arguments for {tool}: {details}")]
    InvalidArguments { tool: String, details: String },

    #[error("tool {tool} failed: {source}")]
    Failed {
        tool: String,
        #[source]
        source: RagError,
    },
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::ServiceError;

    #[test]
    fn rate_limits_and_server_errors_are_transient() {
        let throttled = ServiceError::Status {
            service: "gemini".to_string(),
            status: 429,
            details: "quota".to_string(),
        };
        let unavailable = ServiceError::Status {
            service: "gemini".to_string(),
            status: 503,
            details: "overloaded".to_string(),
        };
        assert!(throttled.is_transient());
        assert!(unavailable.is_transient());
    }

    #[test]
    fn client_errors_are_not_transient() {
        let bad_request = ServiceError::Status {
            service: "gemini".to_string(),
            status: 400,
            details: "malformed".to_string(),
        };
        assert!(!bad_request.is_transient());
        assert!(!ServiceError::InvalidInput("empty".to_string()).is_transient());
        assert!(!ServiceError::MissingCredential("GOOGLE_API_KEY".to_string()).is_transient());
    }
}
