use crate::http::ApiError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::Json;
use common::domain::DomainError;
use serde::de::DeserializeOwned;

/// `Json` whose rejections are reported as validation errors in the usual
/// error body instead of axum's plain-text response
#[derive(Debug, Clone)]
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(json_rejection_error(rejection).into()),
        }
    }
}

pub fn json_rejection_error(rejection: JsonRejection) -> DomainError {
    DomainError::ValidationError(rejection.body_text())
}
