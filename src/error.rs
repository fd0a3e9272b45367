use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use failure::Fail;
use log::error;
use serde_json::json;

#[derive(Debug, Fail)]
pub enum AppError {
    #[fail(display = "Access token required")]
    MissingToken,
    #[fail(display = "Invalid or expired token")]
    InvalidToken,
    #[fail(display = "Access denied")]
    Forbidden,
    #[fail(display = "{}", _0)]
    InvalidCredentials(String),
    #[fail(display = "{}", _0)]
    Validation(String),
    #[fail(display = "Please complete your profile")]
    ProfileIncomplete { user_id: i32 },
    #[fail(display = "{} not found", _0)]
    NotFound(&'static str),
    #[fail(display = "Service unavailable - Database not configured")]
    StoreUnavailable,
    #[fail(display = "Service unavailable - Database unreachable")]
    Pool(#[cause] r2d2::Error),
    #[fail(display = "Database error")]
    Database(#[cause] diesel::result::Error),
    #[fail(display = "Internal error: {}", _0)]
    Internal(String),
}

impl AppError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        AppError::Validation(msg.into())
    }

    /// Maps a missing row to `NotFound(what)`, anything else to a database error.
    pub fn db(what: &'static str) -> impl Fn(diesel::result::Error) -> AppError {
        move |e| match e {
            diesel::result::Error::NotFound => AppError::NotFound(what),
            e => AppError::Database(e),
        }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(e: diesel::result::Error) -> Self {
        AppError::Database(e)
    }
}

impl From<r2d2::Error> for AppError {
    fn from(e: r2d2::Error) -> Self {
        AppError::Pool(e)
    }
}

impl From<BlockingError> for AppError {
    fn from(e: BlockingError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::MissingToken | AppError::InvalidToken | AppError::InvalidCredentials(_) => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::ProfileIncomplete { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::StoreUnavailable | AppError::Pool(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            match self.cause() {
                Some(cause) => error!("{}: {}", self, cause),
                None => error!("{}", self),
            }
        }
        let body = match self {
            AppError::ProfileIncomplete { user_id } => json!({
                "error": self.to_string(),
                "needs_profile_completion": true,
                "user_id": user_id,
            }),
            _ => json!({ "error": self.to_string() }),
        };
        HttpResponse::build(status).json(body)
    }
}
