use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use tracing::{error, warn};

use super::{AdmissionPipeline, AuthError};
use crate::utils::http::HttpResponse;

pub const TOKEN_HEADER: &str = "Token";

/// Gate for the protected routes. Any refusal, including a storage failure,
/// answers 401 with the cause in `message` and the handler never runs.
pub async fn admission_middleware(
    State(pipeline): State<Arc<AdmissionPipeline>>,
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<HttpResponse<String>>)> {
    let presented = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());

    match pipeline.admit_request(presented).await {
        Ok(identity) => {
            req.extensions_mut().insert(identity);
            Ok(next.run(req).await)
        }
        Err(e) => {
            match &e {
                AuthError::Storage(cause) => error!("admission storage failure: {}", cause),
                e if e.is_credential_failure() => warn!("rejected credentials: {}", e),
                e => warn!("request refused: {}", e),
            }

            let status = StatusCode::UNAUTHORIZED;
            Err((
                status,
                Json(HttpResponse::new(
                    status.as_u16(),
                    e.to_string(),
                    String::new(),
                )),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::service::{RegisterRequest, Registrar};
    use crate::auth::types::{Identity, SubscriptionPlan};
    use crate::storage::{CredentialStore, InMemoryStore};
    use axum::{body::Body, http, middleware, routing::get, Extension, Router};
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn whoami(Extension(identity): Extension<Identity>) -> String {
        identity.user_id.to_string()
    }

    async fn setup(limit: i64) -> (Router, String, Uuid) {
        let store = Arc::new(InMemoryStore::new());
        let plan = SubscriptionPlan {
            id: Uuid::new_v4(),
            subscription_type: "free".to_string(),
            request_per_day: limit,
        };
        store.insert_plan(&plan).await.unwrap();
        let registration = Registrar::new(store.clone())
            .register(RegisterRequest {
                name: "mw".to_string(),
                email: "mw@example.com".to_string(),
                subscription_id: plan.id,
                password: "middleware".to_string(),
                confirm_password: "middleware".to_string(),
            })
            .await
            .unwrap();

        let pipeline = Arc::new(AdmissionPipeline::new(store));
        let app = Router::new()
            .route("/whoami", get(whoami))
            .layer(middleware::from_fn_with_state(pipeline, admission_middleware));
        (app, registration.token, registration.user.id)
    }

    fn request(token: Option<&str>) -> http::Request<Body> {
        let mut builder = http::Request::builder().uri("/whoami");
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response) -> HttpResponse<String> {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_admitted_request_reaches_handler() {
        let (app, token, user_id) = setup(5).await;
        let response = app.oneshot(request(Some(&token))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(bytes, user_id.to_string());
    }

    #[tokio::test]
    async fn test_missing_token_is_unauthorized() {
        let (app, _, _) = setup(5).await;
        let response = app.oneshot(request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = body_json(response).await;
        assert_eq!(body.code, 401);
        assert_eq!(body.message, "Unauthorized");
    }

    #[tokio::test]
    async fn test_quota_exhaustion_is_unauthorized() {
        let (app, token, _) = setup(1).await;
        let first = app.clone().oneshot(request(Some(&token))).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = app.oneshot(request(Some(&token))).await.unwrap();
        assert_eq!(second.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(second).await.message, "Rate Limit Exceeded");
    }
}
