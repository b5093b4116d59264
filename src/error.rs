use thiserror::Error;

use crate::validation::FieldErrors;

/// Shown when the backend rejects a request without saying why
pub const GENERIC_SERVER_ERROR: &str = "Ошибка сервера";

/// Everything a console action can fail with
///
/// None of these are retried; the user repeats the action by hand.
#[derive(Error, Debug)]
pub enum ConsoleError {
    /// The form failed client-side checks and was not sent
    #[error("Validation failed for {} field(s)", .0.len())]
    Validation(FieldErrors),

    /// The backend answered with an error status
    #[error("Backend rejected the request ({status}): {}", .message.as_deref().unwrap_or(GENERIC_SERVER_ERROR))]
    Rejected { status: u16, message: Option<String> },

    #[error("Not logged in")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Record not found")]
    NotFound,

    /// The request never got an answer
    #[error("Transport error: {0}")]
    Transport(String),

    /// The answer could not be read
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ConsoleError {
    /// Text for the page banner
    ///
    /// The backend's own message is passed through verbatim when there is one.
    pub fn user_message(&self) -> String {
        match self {
            ConsoleError::Validation(_) => "Проверьте заполнение полей".to_string(),
            ConsoleError::Rejected {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => message.clone(),
            ConsoleError::Rejected { .. } => GENERIC_SERVER_ERROR.to_string(),
            ConsoleError::Unauthorized => "Требуется вход в систему".to_string(),
            ConsoleError::Forbidden => "Недостаточно прав".to_string(),
            ConsoleError::NotFound => "Запись не найдена".to_string(),
            ConsoleError::Transport(message) | ConsoleError::Decode(message) => message.clone(),
        }
    }

    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            ConsoleError::Validation(errors) => Some(errors),
            _ => None,
        }
    }
}

#[cfg(feature = "web")]
impl From<reqwest::Error> for ConsoleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ConsoleError::Decode(err.to_string())
        } else {
            ConsoleError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ConsoleError {
    fn from(err: serde_json::Error) -> Self {
        ConsoleError::Decode(err.to_string())
    }
}

#[cfg(feature = "web")]
impl axum::response::IntoResponse for ConsoleError {
    fn into_response(self) -> axum::response::Response {
        use axum::Json;
        use axum::http::StatusCode;

        let status = match &self {
            ConsoleError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ConsoleError::Rejected { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            ConsoleError::Unauthorized => StatusCode::UNAUTHORIZED,
            ConsoleError::Forbidden => StatusCode::FORBIDDEN,
            ConsoleError::NotFound => StatusCode::NOT_FOUND,
            ConsoleError::Transport(_) | ConsoleError::Decode(_) => StatusCode::BAD_GATEWAY,
        };

        let body = serde_json::json!({
            "message": self.user_message(),
            "fields": self.field_errors(),
        });
        (status, Json(body)).into_response()
    }
}
