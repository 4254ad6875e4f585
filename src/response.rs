use crate::rate_limit_config::RateLimitOptions;
use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};

pub const DEFAULT_QUOTA_EXCEEDED_MESSAGE: &str = "API calls quota exceeded! maximum admitted";
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Response sent for a rejected request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaExceeded {
    pub status: StatusCode,
    pub content_type: String,
    pub content: String,
}

impl Default for QuotaExceeded {
    fn default() -> Self {
        Self {
            status: StatusCode::TOO_MANY_REQUESTS,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            content: DEFAULT_QUOTA_EXCEEDED_MESSAGE.to_string(),
        }
    }
}

impl QuotaExceeded {
    /// The dedicated response block wins over the flat options, which win
    /// over the defaults.
    pub fn from_options(options: &RateLimitOptions) -> Self {
        let defaults = Self::default();
        let custom = options.quota_exceeded_response.as_ref();

        let status = custom
            .and_then(|r| r.status_code)
            .or(options.http_status_code)
            .and_then(|code| StatusCode::from_u16(code).ok())
            .unwrap_or(defaults.status);

        let content_type = custom
            .and_then(|r| r.content_type.clone())
            .unwrap_or(defaults.content_type);

        let content = custom
            .and_then(|r| r.content.clone())
            .or_else(|| options.quota_exceeded_message.clone())
            .unwrap_or(defaults.content);

        Self {
            status,
            content_type,
            content,
        }
    }
}

impl IntoResponse for QuotaExceeded {
    fn into_response(self) -> Response {
        let content_type = HeaderValue::from_str(&self.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(DEFAULT_CONTENT_TYPE));

        let mut response = Response::new(Body::from(self.content));
        *response.status_mut() = self.status;
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, content_type);
        response
    }
}
