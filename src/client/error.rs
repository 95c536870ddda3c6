/// Errors returned by the provisioning API client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 401 Unauthorized / 403 Forbidden.
    #[error("authentication error: {0}")]
    Auth(String),

    /// 404 Not Found.
    #[error("not found: {0}")]
    NotFound(String),

    /// 400 Bad Request.
    #[error("validation error: {0}")]
    Validation(String),

    /// Any other non-2xx status.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Network / connection error, including request timeouts.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An operation needed a connected client but none was initialized.
    #[error("client not initialized")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Map an HTTP status + body to the appropriate error variant.
///
/// The API reports errors as `{"message": "..."}`; some proxies use
/// `{"error": "..."}`. Anything else is passed through verbatim.
pub fn error_from_status(status: u16, body: &str) -> Error {
    let message = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(|e| e.as_str().map(String::from))
        })
        .unwrap_or_else(|| body.to_string());

    match status {
        400 => Error::Validation(message),
        401 | 403 => Error::Auth(message),
        404 => Error::NotFound(message),
        _ => Error::Server { status, message },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_status_codes() {
        assert!(matches!(error_from_status(400, "bad"), Error::Validation(m) if m == "bad"));
        assert!(matches!(error_from_status(401, ""), Error::Auth(_)));
        assert!(matches!(error_from_status(403, ""), Error::Auth(_)));
        assert!(matches!(error_from_status(404, ""), Error::NotFound(_)));
        assert!(matches!(
            error_from_status(503, "down"),
            Error::Server { status: 503, .. }
        ));
    }

    #[test]
    fn extracts_message_field() {
        let err = error_from_status(404, r#"{"statusCode":404,"message":"Sandbox not found"}"#);
        assert_eq!(err.to_string(), "not found: Sandbox not found");

        let err = error_from_status(500, r#"{"error":"boom"}"#);
        assert_eq!(err.to_string(), "server error (500): boom");
    }
}
