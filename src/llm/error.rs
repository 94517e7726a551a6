use std::fmt;
use thiserror::Error;

/// Coarse bucket for a non-success provider status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpErrorCategory {
    BadRequest,
    AccessDenied,
    NotFound,
    Provider,
}

impl HttpErrorCategory {
    pub fn from_status(status: u16) -> Self {
        match status {
            400 => HttpErrorCategory::BadRequest,
            403 => HttpErrorCategory::AccessDenied,
            404 => HttpErrorCategory::NotFound,
            _ => HttpErrorCategory::Provider,
        }
    }
}

impl fmt::Display for HttpErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HttpErrorCategory::BadRequest => "bad request",
            HttpErrorCategory::AccessDenied => "access denied",
            HttpErrorCategory::NotFound => "endpoint not found",
            HttpErrorCategory::Provider => "provider error",
        };
        write!(f, "{}", label)
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing Gemini configuration: {0}")]
    Configuration(String),

    #[error("{}", describe_http(.status, .status_text))]
    Http {
        status: u16,
        status_text: String,
        body: String,
    },

    #[error("Request was cancelled before Gemini replied")]
    Cancelled,
    #[error("No response generated from Gemini")]
    EmptyResponse,

    #[error("Could not reach Gemini: {0}")]
    Network(String),

    #[error("Unreadable Gemini response: {0}")]
    Decode(String),
}

impl LlmError {
    /// Only meaningful for `Http`; everything else is reported as `None`.
    pub fn category(&self) -> Option<HttpErrorCategory> {
        match self {
            LlmError::Http { status, .. } => Some(HttpErrorCategory::from_status(*status)),
            _ => None,
        }
    }
}

fn describe_http(status: &u16, status_text: &str) -> String {
    match HttpErrorCategory::from_status(*status) {
        HttpErrorCategory::NotFound =>
            "Gemini API endpoint not found. Please check your API key and model name.".to_string(),
        HttpErrorCategory::BadRequest =>
            "Bad request to Gemini API. Please check your request format.".to_string(),
        HttpErrorCategory::AccessDenied =>
            "Access denied. Please check your Gemini API key.".to_string(),
        HttpErrorCategory::Provider => format!("Gemini API error: {} {}", status, status_text),
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        // the request url carries the api key in its query
        let err = err.without_url();
        if err.is_decode() {
            LlmError::Decode(err.to_string())
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_categories() {
        assert_eq!(HttpErrorCategory::from_status(400), HttpErrorCategory::BadRequest);
        assert_eq!(HttpErrorCategory::from_status(403), HttpErrorCategory::AccessDenied);
        assert_eq!(HttpErrorCategory::from_status(404), HttpErrorCategory::NotFound);
        assert_eq!(HttpErrorCategory::from_status(500), HttpErrorCategory::Provider);
        assert_eq!(HttpErrorCategory::from_status(429), HttpErrorCategory::Provider);
    }

    #[test]
    fn http_error_messages_are_readable() {
        let err = LlmError::Http {
            status: 503,
            status_text: "Service Unavailable".into(),
            body: "{}".into(),
        };
        assert_eq!(err.to_string(), "Gemini API error: 503 Service Unavailable");
        assert_eq!(err.category(), Some(HttpErrorCategory::Provider));

        let denied = LlmError::Http { status: 403, status_text: "Forbidden".into(), body: String::new() };
        assert!(denied.to_string().starts_with("Access denied"));

        let bad = LlmError::Http { status: 400, status_text: "Bad Request".into(), body: String::new() };
        assert_eq!(
            bad.to_string(),
            "Bad request to Gemini API. Please check your request format."
        );
        assert_eq!(bad.category(), Some(HttpErrorCategory::BadRequest));

        let missing = LlmError::Http { status: 404, status_text: "Not Found".into(), body: String::new() };
        assert_eq!(
            missing.to_string(),
            "Gemini API endpoint not found. Please check your API key and model name."
        );
        assert_eq!(missing.category(), Some(HttpErrorCategory::NotFound));
        assert_eq!(LlmError::EmptyResponse.category(), None);
    }
}
