use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use super::{failure, found, listed, reply, ApiReply};
use crate::auth::SubscriptionPlan;
use crate::statistics::{Continent, Country};
use crate::storage::StorageError;
use crate::AppContext;

#[derive(Debug, Deserialize)]
pub struct NewContinent {
    pub name: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct NewCountry {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub continent_id: Option<Uuid>,
}

pub fn reference_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/continents", get(list_continents).post(add_continent))
        .route("/continents/:id", get(get_continent))
        .route("/countries", get(list_countries).post(add_country))
        .route("/countries/:id", get(get_country))
        .route("/subscriptions", get(list_subscriptions))
        .route("/subscriptions/:id", get(get_subscription))
        .with_state(ctx)
}

async fn list_continents(State(ctx): State<Arc<AppContext>>) -> ApiReply<Vec<Continent>> {
    listed(ctx.statistics.list_continents().await, "continents")
}

async fn get_continent(State(ctx): State<Arc<AppContext>>, Path(id): Path<Uuid>) -> ApiReply<Continent> {
    found(ctx.statistics.get_continent(id).await, "Continent", id)
}

async fn add_continent(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<NewContinent>,
) -> ApiReply<Continent> {
    if req.name.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Continent name required");
    }

    let continent = Continent {
        id: Uuid::new_v4(),
        name: req.name.trim().to_string(),
        code: req.code.trim().to_string(),
    };
    match ctx.statistics.insert_continent(&continent).await {
        Ok(()) => {
            info!(continent = %continent.name, "continent added");
            reply(StatusCode::CREATED, continent)
        }
        Err(e @ StorageError::Conflict(_)) => failure(StatusCode::CONFLICT, e),
        Err(e) => {
            error!("Failed to add continent: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn list_countries(State(ctx): State<Arc<AppContext>>) -> ApiReply<Vec<Country>> {
    listed(ctx.statistics.list_countries().await, "countries")
}

async fn get_country(State(ctx): State<Arc<AppContext>>, Path(id): Path<Uuid>) -> ApiReply<Country> {
    found(ctx.statistics.get_country(id).await, "Country", id)
}

async fn add_country(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<NewCountry>,
) -> ApiReply<Country> {
    if req.name.trim().is_empty() {
        return failure(StatusCode::BAD_REQUEST, "Country name required");
    }

    if let Some(continent_id) = req.continent_id {
        match ctx.statistics.get_continent(continent_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                return failure(
                    StatusCode::BAD_REQUEST,
                    format!("Unknown continent {}", continent_id),
                )
            }
            Err(e) => {
                error!("Failed to look up continent {}: {}", continent_id, e);
                return failure(StatusCode::INTERNAL_SERVER_ERROR, e);
            }
        }
    }

    let country = Country {
        id: Uuid::new_v4(),
        continent_id: req.continent_id,
        name: req.name.trim().to_string(),
        code: req.code.trim().to_string(),
    };
    match ctx.statistics.insert_country(&country).await {
        Ok(()) => {
            info!(country = %country.name, "country added");
            reply(StatusCode::CREATED, country)
        }
        Err(e @ StorageError::Conflict(_)) => failure(StatusCode::CONFLICT, e),
        Err(e) => {
            error!("Failed to add country: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn list_subscriptions(State(ctx): State<Arc<AppContext>>) -> ApiReply<Vec<SubscriptionPlan>> {
    listed(ctx.credentials.list_plans().await, "subscriptions")
}

async fn get_subscription(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<Uuid>,
) -> ApiReply<SubscriptionPlan> {
    found(ctx.credentials.get_plan(id).await, "Subscription", id)
}
