//! Example consumer: a todo service that registers its resources by hand instead of relying on
//! `resource_routes`, so each one gets its own schemas and permission gates.
//!
//! Run from repo root: `cargo run -p example-consumer`

use crud_scaffold::{
    add_crud_routes, app_router, apply_migrations, AppState, ensure_database_exists, load_from_path, logging, resolve,
    set_permissions, AuthenticationRequired, CrudResource, CrudRouteOptions, CrudService, MemoryStore, Operation,
    Permission, PermissionGate, PgStore, ResolvedModel, SchemaBuilder, SchemaType, Settings, Store,
    SuperAdminIfAuthenticated, SuperAdminRequired,
};
use axum::Router;
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;
    let _log_guard = logging::init(&settings)?;

    let config = load_from_path(&settings.config_path, settings.db_schema.clone()).await?;
    let model = resolve(&config)?;

    let store: Arc<dyn Store> = match &settings.database_url {
        Some(url) => {
            ensure_database_exists(url).await?;
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await?;
            apply_migrations(&pool, &model).await?;
            Arc::new(PgStore::new(pool))
        }
        None => Arc::new(MemoryStore::new()),
    };

    let api = todo_routes(&model, store.clone(), settings.max_page_limit)?;
    let bind_addr = settings.bind_addr.clone();
    let app = app_router(AppState::new(store, model, settings), api);

    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("todo service listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

fn todo_routes(model: &ResolvedModel, store: Arc<dyn Store>, max_limit: u64) -> Result<Router, Box<dyn std::error::Error>> {
    let user = model.entity("User").ok_or("entity User is not configured")?.clone();
    let todo = model.entity("Todo").ok_or("entity Todo is not configured")?.clone();

    let user_key = todo.column_type("user").ok_or("Todo.user has no column")?;
    let user_out = SchemaBuilder::new(user.clone()).build()?;
    let todo_out = SchemaBuilder::new(todo.clone())
        .include("user", SchemaType::Scalar(user_key))
        .build()?;
    let todo_with_user = SchemaBuilder::new(todo.clone())
        .include("user", SchemaType::Nested(user_out))
        .name("TodoWithUser")
        .build()?;
    let user_with_todos = SchemaBuilder::new(user.clone())
        .include("todos", SchemaType::List(todo_out))
        .name("UserWithTodos")
        .build()?;

    let managed = ["id", "created_at", "updated_at", "deleted", "deleted_at"];
    let todo_in = SchemaBuilder::new(todo.clone())
        .exclude(managed)
        .include("user", SchemaType::Scalar(user_key))
        .orm(false)
        .build()?;
    let user_in = SchemaBuilder::new(user.clone()).exclude(managed).orm(false).build()?;

    let todos = CrudResource::new(CrudService::new(todo), todo_in.clone(), todo_in).with_response_schema(todo_with_user);
    let users =
        CrudResource::new(CrudService::new(user), user_in.clone(), user_in).with_response_schema(user_with_todos);

    let signed_in = set_permissions([Box::new(AuthenticationRequired) as Box<dyn Permission>]);
    let todo_options = CrudRouteOptions::default()
        .max_limit(max_limit)
        .permissions(Operation::PostOne, signed_in.clone())
        .permissions(Operation::PutOne, signed_in.clone())
        .permissions(Operation::DeleteOne, signed_in);
    let user_options = CrudRouteOptions::default()
        .max_limit(max_limit)
        .permissions_all(PermissionGate::new().require(AuthenticationRequired).require(SuperAdminRequired))
        .permissions(Operation::GetAll, PermissionGate::new().require(SuperAdminIfAuthenticated))
        .disable(Operation::DeleteOne);

    let router = add_crud_routes(Router::new(), "/todo", store.clone(), todos, &todo_options);
    Ok(add_crud_routes(router, "/user", store, users, &user_options))
}
