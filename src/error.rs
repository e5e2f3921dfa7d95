use thiserror::Error;

/// Typed error for the externally triggered operations (enqueue, fetch,
/// generate, post).
///
/// Serializes as `{ "reason": "...", "message": "..." }` so callers get a
/// machine-readable reason next to the human message, while Rust code can
/// still match on variants or propagate with `?`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad input shape, rejected before the store is touched.
    #[error("{0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A precondition field is still empty (e.g. no prompt yet).
    #[error("Not ready: {0}")]
    NotReady(String),

    /// An external collaborator failed or returned non-success.
    #[error("{0}")]
    Collaborator(String),

    #[error("{0}")]
    Database(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Json(String),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    /// Stable machine-readable code for this error.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "invalid",
            AppError::NotFound(_) => "not_found",
            AppError::NotReady(_) => "not_ready",
            AppError::Collaborator(_) => "collaborator_failure",
            AppError::Database(_) => "database",
            AppError::Io(_) => "io",
            AppError::Json(_) => "json",
            AppError::Other(_) => "internal",
        }
    }

    /// Wrap a collaborator failure, keeping the whole context chain.
    pub fn collaborator(e: anyhow::Error) -> Self {
        AppError::Collaborator(format!("{:#}", e))
    }
}

impl serde::Serialize for AppError {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut st = s.serialize_struct("AppError", 2)?;
        st.serialize_field("reason", self.reason())?;
        st.serialize_field("message", &self.to_string())?;
        st.end()
    }
}

// ── From impls ─────────────────────────────────────────────────────────────

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Database(format!("{:#}", e))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Json(e.to_string())
    }
}

impl From<String> for AppError {
    fn from(s: String) -> Self {
        AppError::Other(s)
    }
}

impl From<&str> for AppError {
    fn from(s: &str) -> Self {
        AppError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_codes() {
        assert_eq!(AppError::Validation("x".into()).reason(), "invalid");
        assert_eq!(AppError::NotFound("x".into()).reason(), "not_found");
        assert_eq!(AppError::NotReady("x".into()).reason(), "not_ready");
        assert_eq!(
            AppError::Collaborator("x".into()).reason(),
            "collaborator_failure"
        );
    }

    #[test]
    fn test_serializes_reason_and_message() {
        let err = AppError::NotFound("Comment 7".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["reason"], "not_found");
        assert_eq!(json["message"], "Not found: Comment 7");
    }
}
