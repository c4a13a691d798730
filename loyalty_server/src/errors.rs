use actix_web::{
    error::ResponseError,
    http::StatusCode,
    HttpResponse,
};
use loyalty_engine::{traits::UserApiError, worker::WorkerPoolError};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid request body: {0}")]
    InvalidRequestBody(String),
    #[error("Authentication failed. {0}")]
    Unauthorized(String),
    #[error("Not enough points on the balance")]
    InsufficientPoints,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("The order number failed validation")]
    InvalidOrderNumber,
    #[error("The order processing queue is full. Try again later")]
    QueueFull,
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("Could not initialize the server. {0}")]
    InitializeError(String),
    #[error("Backend error. {0}")]
    BackendError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match *self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientPoints => StatusCode::PAYMENT_REQUIRED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InvalidOrderNumber => StatusCode::UNPROCESSABLE_ENTITY,
            Self::QueueFull => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({"error": self.to_string()}))
    }
}

impl From<UserApiError> for ServerError {
    fn from(e: UserApiError) -> Self {
        match e {
            UserApiError::UserDoesNotExist(s) => ServerError::NotFound(s),
            UserApiError::EmailTaken(_)
            | UserApiError::OrderAlreadyExists(_)
            | UserApiError::OrderConflict(_)
            | UserApiError::DuplicateWithdrawal(_) => ServerError::Conflict(e.to_string()),
            UserApiError::InvalidOrderNumber(_) => ServerError::InvalidOrderNumber,
            UserApiError::InsufficientFunds => ServerError::InsufficientPoints,
            UserApiError::OrderNotFound(n) => ServerError::NotFound(n.to_string()),
            UserApiError::DatabaseError(s) => ServerError::BackendError(s),
        }
    }
}

impl From<WorkerPoolError> for ServerError {
    fn from(e: WorkerPoolError) -> Self {
        match e {
            WorkerPoolError::BufferFull => ServerError::QueueFull,
            other => ServerError::BackendError(other.to_string()),
        }
    }
}

//--------------------------------------      AuthError     ----------------------------------------------------------
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("The access token is not in the correct format. {0}")]
    PoorlyFormattedToken(String),
    #[error("Could not validate the token. {0}")]
    ValidationError(String),
    #[error("No access token was provided")]
    MissingToken,
}

impl From<AuthError> for ServerError {
    fn from(e: AuthError) -> Self {
        ServerError::Unauthorized(e.to_string())
    }
}
