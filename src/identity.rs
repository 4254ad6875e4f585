//! Per-request identity used to key rate-limit state.

/// Client id used when no resolver produced one.
pub const ANONYMOUS_CLIENT: &str = "anon";

/// Immutable identity of a single inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientRequestIdentity {
    pub client_ip: Option<String>,
    pub client_id: String,
    pub path: String,
    pub http_verb: String,
}

impl ClientRequestIdentity {
    /// Build an identity, normalising path and verb.
    ///
    /// A missing client id becomes [`ANONYMOUS_CLIENT`].
    pub fn new(
        client_ip: Option<String>,
        client_id: Option<String>,
        path: &str,
        http_verb: &str,
    ) -> Self {
        Self {
            client_ip,
            client_id: client_id.unwrap_or_else(|| ANONYMOUS_CLIENT.to_string()),
            path: normalize_path(path),
            http_verb: http_verb.to_lowercase(),
        }
    }

    /// `"{verb}:{path}"`, the form endpoint patterns are matched against.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.http_verb, self.path)
    }
}

/// Lowercase the path and strip trailing slashes, keeping a bare `/`.
pub fn normalize_path(path: &str) -> String {
    let lowered = path.to_lowercase();
    if lowered == "/" {
        return lowered;
    }
    lowered.trim_end_matches('/').to_string()
}
