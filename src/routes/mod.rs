//! Route assembly: common routes plus one CRUD resource per configured entity.

pub mod common;
pub mod crud;

pub use common::common_routes;
pub use crud::{add_crud_routes, CrudResource, CrudRouteOptions, Operation, ResourceState};

use crate::error::ConfigError;
use crate::extractors::user::user_from_headers;
use crate::state::AppState;
use axum::{middleware, Router};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// CRUD routes with default schemas for every entity of the model, at `/{path}`.
pub fn resource_routes(state: &AppState) -> Result<Router, ConfigError> {
    let options = CrudRouteOptions::default().max_limit(state.settings.max_page_limit);
    let mut router = Router::new();
    for entity in &state.model.entities {
        let resource = CrudResource::from_entity(entity.clone())?;
        router = add_crud_routes(
            router,
            &format!("/{}", entity.path_segment),
            state.store.clone(),
            resource,
            &options,
        );
    }
    Ok(router)
}

/// Wrap API routes with the common routes and the HTTP middleware stack.
/// `api` is mounted under `/api/v1`.
pub fn app_router(state: AppState, api: Router) -> Router {
    let body_limit = state.settings.body_limit_bytes;
    Router::new()
        .merge(common_routes(state))
        .nest("/api/v1", api)
        .layer(middleware::from_fn(user_from_headers))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
