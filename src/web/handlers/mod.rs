use std::sync::Arc;

use std::fmt::Display;

use axum::{http::StatusCode, Json, Router};
use tracing::error;

use crate::storage::StorageResult;
use crate::utils::http::HttpResponse;
use crate::AppContext;

pub mod reference;
pub mod statistics;
pub mod users;

/// Status plus the JSON envelope; `body` is empty on failure.
pub type ApiReply<T> = (StatusCode, Json<HttpResponse<Option<T>>>);

pub(crate) fn reply<T>(status: StatusCode, body: T) -> ApiReply<T> {
    let message = status.canonical_reason().unwrap_or_default().to_string();
    (status, Json(HttpResponse::new(status.as_u16(), message, Some(body))))
}

pub(crate) fn failure<T>(status: StatusCode, message: impl ToString) -> ApiReply<T> {
    (
        status,
        Json(HttpResponse::new(status.as_u16(), message.to_string(), None)),
    )
}

/// 200 with the rows, or 500.
pub(crate) fn listed<T>(result: StorageResult<Vec<T>>, what: &str) -> ApiReply<Vec<T>> {
    match result {
        Ok(rows) => reply(StatusCode::OK, rows),
        Err(e) => {
            error!("Failed to list {}: {}", what, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// 200 with the row, 404 when absent, or 500.
pub(crate) fn found<T>(result: StorageResult<Option<T>>, what: &str, id: impl Display) -> ApiReply<T> {
    match result {
        Ok(Some(row)) => reply(StatusCode::OK, row),
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("{} {} not found", what, id)),
        Err(e) => {
            error!("Failed to get {} {}: {}", what, id, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

pub fn router(ctx: Arc<AppContext>) -> Router {
    let api = Router::new()
        .merge(statistics::statistics_router(ctx.clone()))
        .merge(reference::reference_router(ctx.clone()))
        .merge(users::users_router(ctx));

    Router::new().nest("/api/v1", api)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::types::SubscriptionPlan;
    use crate::auth::TOKEN_HEADER;
    use crate::statistics::{
        Continent, Country, SourceError, StatisticSnapshot, StatisticSource, StatisticValues,
    };
    use crate::storage::{CredentialStore, InMemoryStore, StatisticStore};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use axum::response::Response;
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use uuid::Uuid;

    struct FixedSource;

    #[async_trait]
    impl StatisticSource for FixedSource {
        async fn fetch(&self) -> Result<Vec<StatisticSnapshot>, SourceError> {
            Ok(vec![
                StatisticSnapshot {
                    country: "Italy".to_string(),
                    values: StatisticValues {
                        total_cases: "10".to_string(),
                        ..StatisticValues::default()
                    },
                },
                StatisticSnapshot {
                    country: "Narnia".to_string(),
                    values: StatisticValues::default(),
                },
            ])
        }
    }

    struct TestApp {
        app: Router,
        plan: SubscriptionPlan,
        europe: Continent,
        italy: Country,
    }

    async fn setup(limit: i64) -> TestApp {
        let store = Arc::new(InMemoryStore::new());
        let plan = SubscriptionPlan {
            id: Uuid::new_v4(),
            subscription_type: "free".to_string(),
            request_per_day: limit,
        };
        store.insert_plan(&plan).await.unwrap();
        let europe = Continent {
            id: Uuid::new_v4(),
            name: "Europe".to_string(),
            code: "EU".to_string(),
        };
        store.insert_continent(&europe).await.unwrap();
        let italy = Country {
            id: Uuid::new_v4(),
            continent_id: Some(europe.id),
            name: "Italy".to_string(),
            code: "IT".to_string(),
        };
        store.insert_country(&italy).await.unwrap();

        let ctx = Arc::new(AppContext::new(store.clone(), store, Arc::new(FixedSource)));
        TestApp {
            app: router(ctx),
            plan,
            europe,
            italy,
        }
    }

    fn signup(test: &TestApp, email: &str) -> Value {
        json!({
            "name": "Web",
            "email": email,
            "subscription_id": test.plan.id,
            "password": "open sesame",
            "confirm_password": "open sesame",
        })
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(TOKEN_HEADER, token);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn register(test: &TestApp, email: &str) -> String {
        let (status, body) = send(&test.app, post("/api/v1/register", signup(test, email))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["body"]["user"].get("password_hash").is_none());
        body["body"]["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_register_ingest_and_read() {
        let test = setup(3).await;
        let token = register(&test, "web@example.com").await;

        let (status, body) = send(&test.app, post("/api/v1/coronavirus", json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"]["upserted"], 1);
        assert_eq!(body["body"]["unmatched"], json!(["Narnia"]));

        let (status, body) = send(&test.app, get("/api/v1/coronavirus?index=1&size=5", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"].as_array().unwrap().len(), 1);
        assert_eq!(body["body"][0]["total_cases"], "10");

        let (status, body) = send(&test.app, get("/api/v1/coronavirus/countries/italy", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"]["total_cases"], "10");

        let (status, _) = send(&test.app, get("/api/v1/coronavirus/countries/narnia", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        // three admitted requests used the whole quota
        let (status, body) = send(&test.app, get("/api/v1/coronavirus", Some(&token))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Rate Limit Exceeded");
    }

    #[tokio::test]
    async fn test_protected_routes_need_token() {
        let test = setup(3).await;
        let (status, body) = send(&test.app, get("/api/v1/coronavirus", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401);

        let (status, _) = send(&test.app, get("/api/v1/coronavirus/countries/italy", Some("bogus"))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_open_reference_routes() {
        let test = setup(3).await;
        let (status, body) = send(&test.app, get("/api/v1/countries", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"][0]["name"], "Italy");

        let (status, body) = send(&test.app, get("/api/v1/subscriptions", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"][0]["request_per_day"], 3);
    }

    #[tokio::test]
    async fn test_register_errors() {
        let test = setup(3).await;
        register(&test, "twice@example.com").await;

        let (status, _) = send(&test.app, post("/api/v1/register", signup(&test, "twice@example.com"))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let mut unknown_plan = signup(&test, "new@example.com");
        unknown_plan["subscription_id"] = json!(Uuid::new_v4());
        let (status, body) = send(&test.app, post("/api/v1/register", unknown_plan)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No subscription");

        let mut mismatch = signup(&test, "new@example.com");
        mismatch["confirm_password"] = json!("open says me");
        let (status, body) = send(&test.app, post("/api/v1/register", mismatch)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Password does not match");
    }

    #[tokio::test]
    async fn test_login() {
        let test = setup(3).await;
        register(&test, "login@example.com").await;

        let (status, body) = send(
            &test.app,
            post("/api/v1/login", json!({"email": "login@example.com", "password": "open sesame"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"]["email"], "login@example.com");
        assert!(body["body"].get("password_hash").is_none());

        let (status, body) = send(
            &test.app,
            post("/api/v1/login", json!({"email": "login@example.com", "password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Incorrect email or password");

        let (status, _) = send(
            &test.app,
            post("/api/v1/login", json!({"email": "ghost@example.com", "password": "open sesame"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_statistics_by_continent() {
        let test = setup(5).await;
        let token = register(&test, "continent@example.com").await;
        send(&test.app, post("/api/v1/coronavirus", json!({}))).await;

        let (status, body) = send(&test.app, post("/api/v1/continents", json!({"name": "Asia", "code": "AS"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&test.app, post("/api/v1/continents", json!({"name": "asia", "code": "AS"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let asia = body["body"]["id"].as_str().unwrap().to_string();

        let (status, body) = send(&test.app, get("/api/v1/coronavirus/continents/europe", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"].as_array().unwrap().len(), 1);
        assert_eq!(body["body"][0]["country_id"], json!(test.italy.id));

        let (status, body) = send(&test.app, get("/api/v1/coronavirus/continents/Asia", Some(&token))).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["body"].as_array().unwrap().is_empty());

        let (status, _) = send(&test.app, get("/api/v1/coronavirus/continents/Atlantis", Some(&token))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&test.app, get("/api/v1/coronavirus/continents/europe", None)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&test.app, get(&format!("/api/v1/continents/{}", asia), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"]["name"], "Asia");
    }

    #[tokio::test]
    async fn test_huge_page_index() {
        let test = setup(3).await;
        let token = register(&test, "pages@example.com").await;
        send(&test.app, post("/api/v1/coronavirus", json!({}))).await;

        let (status, body) = send(
            &test.app,
            get("/api/v1/coronavirus?index=18446744073709551615&size=10", Some(&token)),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["body"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detail_routes() {
        let test = setup(3).await;

        let (status, body) = send(&test.app, get(&format!("/api/v1/countries/{}", test.italy.id), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"]["continent_id"], json!(test.europe.id));

        let (status, _) = send(&test.app, get(&format!("/api/v1/countries/{}", Uuid::new_v4()), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(
            &test.app,
            post(
                "/api/v1/countries",
                json!({"name": "France", "code": "FR", "continent_id": test.europe.id}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["body"]["name"], "France");

        let (status, _) = send(
            &test.app,
            post(
                "/api/v1/countries",
                json!({"name": "Lemuria", "code": "LM", "continent_id": Uuid::new_v4()}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&test.app, post("/api/v1/countries", json!({"name": "ITALY", "code": "IT"}))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&test.app, get(&format!("/api/v1/subscriptions/{}", test.plan.id), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"]["subscription_type"], "free");
    }

    #[tokio::test]
    async fn test_token_and_rate_limit_routes() {
        let test = setup(3).await;
        let token = register(&test, "meta@example.com").await;
        send(&test.app, get("/api/v1/coronavirus", Some(&token))).await;

        let (status, body) = send(&test.app, get("/api/v1/tokens", None)).await;
        assert_eq!(status, StatusCode::OK);
        let listed = &body["body"][0];
        assert!(listed.get("token_key").is_none());
        let token_id = listed["id"].as_str().unwrap().to_string();
        let user_id = listed["user_id"].as_str().unwrap().to_string();

        let (status, body) = send(&test.app, get(&format!("/api/v1/tokens/{}", token_id), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"]["is_active"], true);

        let (status, body) = send(&test.app, get("/api/v1/rate_limits", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"][0]["total_request"], 1);

        let (status, body) = send(&test.app, get(&format!("/api/v1/rate_limits/{}", user_id), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["body"]["total_request"], 1);

        let (status, _) = send(&test.app, get(&format!("/api/v1/rate_limits/{}", Uuid::new_v4()), None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
