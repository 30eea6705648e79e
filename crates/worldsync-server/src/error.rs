use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use worldsync_core::WorldError;

/// Unified error type for HTTP responses.
///
/// Clients only ever see a typed `{success: false, error}` body — never a
/// raw stack trace or an untyped exception.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if let Some(e) = self.0.downcast_ref::<WorldError>() {
            match e {
                WorldError::MalformedToken
                | WorldError::InvalidTokenSignature
                | WorldError::TokenExpired => StatusCode::UNAUTHORIZED,
                WorldError::SyncGroupNotFound(_) => StatusCode::NOT_FOUND,
                WorldError::InvalidActionStatus(_) => StatusCode::BAD_REQUEST,
                WorldError::MissingConfig(_)
                | WorldError::Persistence(_)
                | WorldError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        let body = serde_json::json!({ "success": false, "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_token_maps_to_401() {
        let err = AppError(WorldError::MalformedToken.into());
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn expired_token_maps_to_401() {
        let err = AppError(WorldError::TokenExpired.into());
        assert_eq!(err.into_response().status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn sync_group_not_found_maps_to_404() {
        let err = AppError(WorldError::SyncGroupNotFound("public.FAST".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_action_status_maps_to_400() {
        let err = AppError(WorldError::InvalidActionStatus("RUNNING".into()).into());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn persistence_error_maps_to_500() {
        let err = AppError(WorldError::Persistence("connection refused".into()).into());
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn non_world_error_maps_to_500() {
        let err = AppError(anyhow::anyhow!("something unexpected"));
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_body_is_discriminated_json() {
        let err = AppError(WorldError::MalformedToken.into());
        let response = err.into_response();
        let ct = response
            .headers()
            .get(axum::http::header::CONTENT_TYPE)
            .expect("should have content-type");
        assert!(ct.to_str().unwrap().contains("application/json"));
    }
}
