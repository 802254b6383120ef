//! crud-scaffold: configuration-driven CRUD routes with pagination, soft delete and permission gates.

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod logging;
pub mod migration;
pub mod pagination;
pub mod permission;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use config::{load_from_path, resolve, FullConfig, ResolvedEntity, ResolvedModel, Settings};
pub use error::{AppError, ConfigError};
pub use extractors::{user_from_headers, CurrentUser};
pub use migration::apply_migrations;
pub use pagination::Pagination;
pub use permission::{
    enforce, set_permissions, AuthenticationRequired, Permission, PermissionGate, SuperAdminIfAuthenticated,
    SuperAdminRequired,
};
pub use response::Page;
pub use routes::{add_crud_routes, app_router, common_routes, resource_routes, CrudResource, CrudRouteOptions, Operation};
pub use schema::{Schema, SchemaBuilder, SchemaType};
pub use service::{CrudService, WriteOptions};
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryStore, PgStore, Store};
