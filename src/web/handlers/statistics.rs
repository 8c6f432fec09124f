use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    routing::get,
    Extension, Router,
};
use std::sync::Arc;
use tracing::{debug, error};

use super::{failure, reply, ApiReply};
use crate::auth::{admission_middleware, Identity};
use crate::schedule::jobs::ingest::INGEST_JOB;
use crate::schedule::{IngestReport, JobContext, TaskError};
use crate::statistics::StatisticRecord;
use crate::web::Pagination;
use crate::AppContext;

/// Reads go through the admission gate; the manual ingest trigger does not.
pub fn statistics_router(ctx: Arc<AppContext>) -> Router {
    let gate = middleware::from_fn_with_state(ctx.admission.clone(), admission_middleware);

    Router::new()
        .route(
            "/coronavirus",
            get(list_statistics).route_layer(gate.clone()).post(run_ingest),
        )
        .route(
            "/coronavirus/continents/:continent",
            get(list_by_continent).route_layer(gate.clone()),
        )
        .route(
            "/coronavirus/countries/:country",
            get(get_statistic).route_layer(gate),
        )
        .with_state(ctx)
}

async fn list_statistics(
    State(ctx): State<Arc<AppContext>>,
    Extension(identity): Extension<Identity>,
    Query(pagination): Query<Pagination>,
) -> ApiReply<Vec<StatisticRecord>> {
    debug!(user_id = %identity.user_id, index = pagination.index, size = pagination.size, "list statistics");
    match ctx.statistics.list_statistics(&pagination).await {
        Ok(records) => reply(StatusCode::OK, records),
        Err(e) => {
            error!("Failed to list statistics: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn list_by_continent(
    State(ctx): State<Arc<AppContext>>,
    Path(continent): Path<String>,
    Query(pagination): Query<Pagination>,
) -> ApiReply<Vec<StatisticRecord>> {
    let found = match ctx.statistics.get_continent_by_name(&continent).await {
        Ok(Some(found)) => found,
        Ok(None) => return failure(StatusCode::NOT_FOUND, format!("Unknown continent {}", continent)),
        Err(e) => {
            error!("Failed to look up continent {}: {}", continent, e);
            return failure(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    match ctx
        .statistics
        .list_statistics_by_continent(found.id, &pagination)
        .await
    {
        Ok(records) => reply(StatusCode::OK, records),
        Err(e) => {
            error!("Failed to list statistics for {}: {}", continent, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn get_statistic(
    State(ctx): State<Arc<AppContext>>,
    Path(country): Path<String>,
) -> ApiReply<StatisticRecord> {
    match ctx.statistics.get_statistic_by_country(&country).await {
        Ok(Some(record)) => reply(StatusCode::OK, record),
        Ok(None) => failure(StatusCode::NOT_FOUND, format!("No data for {}", country)),
        Err(e) => {
            error!("Failed to get statistic for {}: {}", country, e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

async fn run_ingest(State(ctx): State<Arc<AppContext>>) -> ApiReply<IngestReport> {
    match ctx.ingest.run_cycle(&JobContext::detached(INGEST_JOB)).await {
        Ok(report) => reply(StatusCode::OK, report),
        Err(e @ TaskError::Source(_)) => {
            error!("Manual ingest failed: {}", e);
            failure(StatusCode::BAD_GATEWAY, e)
        }
        Err(e) => {
            error!("Manual ingest failed: {}", e);
            failure(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}
