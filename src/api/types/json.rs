//! JSON extractor and responder whose rejections use the gateway error body

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    response::{IntoResponse, Response},
    Json as AxumJson,
};
use serde::{de::DeserializeOwned, Serialize};

use super::error::ApiError;

#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        AxumJson::<T>::from_request(req, state)
            .await
            .map(|AxumJson(value)| Json(value))
            .map_err(|rejection| rejection_to_error(&rejection))
    }
}

/// Keep axum's status; swap the plain-text body for a coded one
fn rejection_to_error(rejection: &JsonRejection) -> ApiError {
    let (code, message) = match rejection {
        JsonRejection::JsonDataError(err) => {
            ("INVALID_JSON", format!("Invalid JSON data: {}", err.body_text()))
        }
        JsonRejection::JsonSyntaxError(err) => {
            ("INVALID_JSON", format!("Invalid JSON syntax: {}", err.body_text()))
        }
        JsonRejection::MissingJsonContentType(_) => (
            "INVALID_CONTENT_TYPE",
            "Expected 'Content-Type: application/json'".to_string(),
        ),
        JsonRejection::BytesRejection(err) => (
            "INVALID_REQUEST",
            format!("Failed to read request body: {}", err.body_text()),
        ),
        _ => ("INVALID_JSON", "Invalid JSON request".to_string()),
    };

    ApiError::new(rejection.status(), code, message)
}

impl<T: Serialize> IntoResponse for Json<T> {
    fn into_response(self) -> Response {
        AxumJson(self.0).into_response()
    }
}
