use super::metrics::StatsSink;
use crate::request::{GatewayRequest, GatewayResponse};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{error, error_span};

/// Why the filter rejected a request.
///
/// This is the closed set of externally visible failures. Structural and
/// cryptographic token problems both surface as [`AuthErrorKind::InvalidToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorKind {
    /// No authorization header and anonymous access not allowed
    MissingAuthorization,
    /// Header present but not of the form `Bearer <token>`
    InvalidRequest,
    /// Token could not be decoded or failed verification
    InvalidToken,
    /// Token valid but not entitled to the resource
    AccessDenied,
}

impl AuthErrorKind {
    pub const ALL: [AuthErrorKind; 4] = [
        AuthErrorKind::MissingAuthorization,
        AuthErrorKind::InvalidRequest,
        AuthErrorKind::InvalidToken,
        AuthErrorKind::AccessDenied,
    ];

    /// Value of the `error` field in the response body
    pub fn code(self) -> &'static str {
        match self {
            AuthErrorKind::MissingAuthorization => "missing_authorization",
            AuthErrorKind::InvalidRequest => "invalid_request",
            AuthErrorKind::InvalidToken => "invalid_token",
            AuthErrorKind::AccessDenied => "access_denied",
        }
    }

    /// Value of the `error_description` field in the response body
    pub fn description(self) -> &'static str {
        match self {
            AuthErrorKind::MissingAuthorization => "Missing Authorization header",
            AuthErrorKind::InvalidRequest => "Invalid Authorization header",
            AuthErrorKind::InvalidToken => "invalid_token",
            AuthErrorKind::AccessDenied => "access_denied",
        }
    }

    /// Parse an error code back into a kind
    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.code() == code)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            AuthErrorKind::MissingAuthorization => 0,
            AuthErrorKind::InvalidRequest => 1,
            AuthErrorKind::InvalidToken => 2,
            AuthErrorKind::AccessDenied => 3,
        }
    }
}

impl fmt::Display for AuthErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.description())
    }
}

impl std::error::Error for AuthErrorKind {}

/// Maps a rejection to an HTTP status code.
pub trait StatusMapper: Send + Sync {
    fn status_for(&self, kind: AuthErrorKind) -> u16;
}

/// 401 for missing/invalid tokens, 400 for a malformed header, 403 for denial.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultStatusMapper;

impl StatusMapper for DefaultStatusMapper {
    fn status_for(&self, kind: AuthErrorKind) -> u16 {
        match kind {
            AuthErrorKind::MissingAuthorization => 401,
            AuthErrorKind::InvalidRequest => 400,
            AuthErrorKind::InvalidToken => 401,
            AuthErrorKind::AccessDenied => 403,
        }
    }
}

/// Single exit point for every rejection.
///
/// Each call builds the `{error, error_description}` body, resolves the
/// status, emits one `error!` event, and bumps the stats counter for that
/// status. With `opentrace` on, the event is recorded inside an
/// `oauthv2` error span.
#[derive(Clone)]
pub struct ErrorResponder {
    mapper: Arc<dyn StatusMapper>,
    stats: Arc<dyn StatsSink>,
    opentrace: bool,
}

impl ErrorResponder {
    pub fn new(mapper: Arc<dyn StatusMapper>, stats: Arc<dyn StatsSink>, opentrace: bool) -> Self {
        Self {
            mapper,
            stats,
            opentrace,
        }
    }

    pub fn stats(&self) -> &Arc<dyn StatsSink> {
        &self.stats
    }

    pub fn respond(&self, kind: AuthErrorKind, req: &GatewayRequest) -> GatewayResponse {
        let status = self.mapper.status_for(kind);
        let body = json!({
            "error": kind.code(),
            "error_description": kind.description(),
        });

        if self.opentrace {
            let span = error_span!(
                "oauthv2",
                request_id = %req.request_id,
                error = kind.code(),
                status
            );
            let _entered = span.enter();
            error!(request_id = %req.request_id, status, error = kind.code(), path = %req.path, "{}", kind.description());
        } else {
            error!(request_id = %req.request_id, status, error = kind.code(), path = %req.path, "{}", kind.description());
        }

        self.stats.increment_status_count(status);
        self.stats.record_rejection(kind);
        GatewayResponse::json(status, body)
    }
}
