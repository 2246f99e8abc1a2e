use thiserror::Error;

/// Why an external fetch produced no data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The upstream answered badly or not at all.
    #[error("upstream unavailable{}: {message}", status_suffix(.status))]
    Upstream { status: Option<u16>, message: String },
    /// A required secret or source is not configured. Never retried.
    #[error("missing credential: {0}")]
    MissingCredential(String),
    /// The queried user does not exist upstream.
    #[error("not found: {0}")]
    NotFound(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl FetchError {
    pub fn upstream(message: impl Into<String>) -> Self {
        FetchError::Upstream {
            status: None,
            message: message.into(),
        }
    }

    /// HTTP-style status for display and logs.
    pub fn status_code(&self) -> u16 {
        match self {
            FetchError::Upstream { status, .. } => status.unwrap_or(502),
            FetchError::MissingCredential(_) => 500,
            FetchError::NotFound(_) => 404,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(FetchError::NotFound("alice".into()).status_code(), 404);
        assert_eq!(FetchError::MissingCredential("GITHUB_TOKEN".into()).status_code(), 500);
        assert_eq!(FetchError::upstream("timeout").status_code(), 502);
        let e = FetchError::Upstream { status: Some(503), message: "busy".into() };
        assert_eq!(e.status_code(), 503);
        assert_eq!(e.to_string(), "upstream unavailable (503): busy");
        assert_eq!(FetchError::upstream("x").to_string(), "upstream unavailable: x");
    }
}
