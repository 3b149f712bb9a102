use std::fmt;

/// Bridge error with upstream status information.
///
/// Used at every boundary that talks to the tool host or the LLM. The status
/// code is whatever the upstream reported; internal failures carry none.
#[derive(Debug, Clone)]
pub struct BridgeError {
    pub message: String,
    pub status_code: Option<u16>,
}

impl BridgeError {
    pub fn new(message: impl Into<String>) -> Self {
        BridgeError {
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(message: impl Into<String>, status_code: u16) -> Self {
        BridgeError {
            message: message.into(),
            status_code: Some(status_code),
        }
    }

    /// Check if this is a client error (4xx status code)
    pub fn is_client_error(&self) -> bool {
        self.status_code
            .map(|c| (400..500).contains(&c))
            .unwrap_or(false)
    }

    /// Check if this is a server error (5xx status code)
    pub fn is_server_error(&self) -> bool {
        self.status_code.map(|c| c >= 500).unwrap_or(false)
    }

    /// The status to report on an agent response built from this error.
    /// Transport failures without an HTTP status count as bad gateway.
    pub fn mcp_status(&self) -> u16 {
        self.status_code.unwrap_or(502)
    }
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.status_code {
            write!(f, "[HTTP {}] {}", code, self.message)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::new(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::new(s)
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        let status = e.status().map(|s| s.as_u16());
        BridgeError {
            message: e.to_string(),
            status_code: status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        let client = BridgeError::with_status("bad request", 404);
        assert!(client.is_client_error());
        assert!(!client.is_server_error());

        let server = BridgeError::with_status("boom", 503);
        assert!(server.is_server_error());

        let plain = BridgeError::new("no status");
        assert!(!plain.is_client_error());
        assert!(!plain.is_server_error());
        assert_eq!(plain.mcp_status(), 502);
    }

    #[test]
    fn test_display_includes_status() {
        let err = BridgeError::with_status("not found", 404);
        assert_eq!(err.to_string(), "[HTTP 404] not found");
        assert_eq!(BridgeError::new("plain").to_string(), "plain");
    }
}
