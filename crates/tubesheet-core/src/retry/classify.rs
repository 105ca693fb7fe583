//! Classify HTTP status and source errors into retry policy error kinds.

use crate::retry::policy::ErrorKind;
use crate::source::SourceError;

/// Classify an HTTP status code for retry decisions.
pub fn classify_http_status(code: u16) -> ErrorKind {
    match code {
        429 | 503 => ErrorKind::Throttled,
        500..=599 => ErrorKind::Http5xx(code),
        _ => ErrorKind::Other,
    }
}

/// Classify a video source error into an ErrorKind.
pub fn classify(e: &SourceError) -> ErrorKind {
    match e {
        SourceError::Timeout(_) => ErrorKind::Timeout,
        SourceError::Connection(_) => ErrorKind::Connection,
        SourceError::Http { status, .. } => classify_http_status(*status),
        SourceError::QuotaExceeded(_) => ErrorKind::QuotaExceeded,
        SourceError::NotFound(_) | SourceError::InvalidInput(_) | SourceError::Other(_) => {
            ErrorKind::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_429_and_503_throttled() {
        assert_eq!(classify_http_status(429), ErrorKind::Throttled);
        assert_eq!(classify_http_status(503), ErrorKind::Throttled);
    }

    #[test]
    fn http_5xx_retryable() {
        assert!(matches!(classify_http_status(500), ErrorKind::Http5xx(500)));
        assert!(matches!(classify_http_status(502), ErrorKind::Http5xx(502)));
    }

    #[test]
    fn http_4xx_other() {
        assert_eq!(classify_http_status(404), ErrorKind::Other);
        assert_eq!(classify_http_status(403), ErrorKind::Other);
    }

    #[test]
    fn source_errors() {
        assert_eq!(
            classify(&SourceError::Timeout("read".into())),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify(&SourceError::QuotaExceeded("quotaExceeded".into())),
            ErrorKind::QuotaExceeded
        );
        assert_eq!(
            classify(&SourceError::NotFound("channel".into())),
            ErrorKind::Other
        );
        assert_eq!(
            classify(&SourceError::Http {
                status: 503,
                message: "backend".into()
            }),
            ErrorKind::Throttled
        );
    }
}
