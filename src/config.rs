use std::env;

/// Read-only process configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Allowed CORS origin for the browser UI. Empty means allow any.
    pub front_origin: Option<String>,
    /// Default tool-host endpoint when the request does not carry one.
    pub local_mcp_endpoint: String,
    /// Bearer token sent to the tool host when set.
    pub local_mcp_token: Option<String>,
    /// Fallback paths used for discovery and summary defaults.
    pub default_paths: Vec<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .unwrap_or_else(|_| "4000".to_string())
                .parse()
                .expect("PORT must be a valid number"),
            front_origin: env::var("FRONT_ORIGIN").ok().filter(|s| !s.is_empty()),
            local_mcp_endpoint: env::var("LOCAL_MCP_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:8931/mcp".to_string()),
            local_mcp_token: env::var("LOCAL_MCP_TOKEN").ok().filter(|s| !s.is_empty()),
            default_paths: parse_default_paths(
                &env::var("LOCAL_MCP_DEFAULT_PATHS").unwrap_or_default(),
            ),
            openai_api_key: env::var("OPENAI_API_KEY").ok().filter(|s| !s.is_empty()),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        }
    }
}

/// Split the comma-separated default-paths variable, falling back to "notes/"
/// when nothing usable is configured.
pub fn parse_default_paths(raw: &str) -> Vec<String> {
    let paths: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if paths.is_empty() {
        vec!["notes/".to_string()]
    } else {
        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_paths() {
        assert_eq!(
            parse_default_paths("notes/, docs/archive ,"),
            vec!["notes/".to_string(), "docs/archive".to_string()]
        );
    }

    #[test]
    fn test_parse_default_paths_empty_falls_back() {
        assert_eq!(parse_default_paths(""), vec!["notes/".to_string()]);
        assert_eq!(parse_default_paths(" , ,"), vec!["notes/".to_string()]);
    }
}
