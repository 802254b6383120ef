//! CRUD route factory: registers list/get/create/update/delete routes for one resource.

use crate::config::{FieldType, RelationKind, ResolvedEntity};
use crate::error::ConfigError;
use crate::handlers::crud as handlers;
use crate::pagination::MAX_LIMIT;
use crate::permission::{enforce, PermissionGate};
use crate::schema::{Schema, SchemaBuilder, SchemaType};
use crate::service::CrudService;
use crate::store::Store;
use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post, put, MethodRouter},
    Router,
};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    GetAll,
    GetOne,
    PostOne,
    PutOne,
    DeleteOne,
}

/// Accessor plus the schemas its routes validate and render with.
pub struct CrudResource {
    pub service: CrudService,
    pub create_schema: Arc<Schema>,
    pub update_schema: Arc<Schema>,
    /// Rows are returned as stored when absent.
    pub response_schema: Option<Arc<Schema>>,
}

impl CrudResource {
    pub fn new(service: CrudService, create_schema: Arc<Schema>, update_schema: Arc<Schema>) -> Self {
        CrudResource {
            service,
            create_schema,
            update_schema,
            response_schema: None,
        }
    }

    pub fn with_response_schema(mut self, schema: Arc<Schema>) -> Self {
        self.response_schema = Some(schema);
        self
    }

    /// Default schemas: inputs leave out the key and bookkeeping fields, to-one relations
    /// are exchanged as key values.
    pub fn from_entity(entity: Arc<ResolvedEntity>) -> Result<Self, ConfigError> {
        let managed: Vec<String> = entity
            .fields
            .iter()
            .filter(|f| f.primary_key || ResolvedEntity::is_bookkeeping(&f.name))
            .map(|f| f.name.clone())
            .collect();
        let keys: Vec<(String, FieldType)> = entity
            .fields
            .iter()
            .filter(|f| f.relation.as_ref().map(|r| r.kind == RelationKind::One).unwrap_or(false))
            .filter_map(|f| f.ty.map(|t| (f.name.clone(), t)))
            .collect();
        let with_keys = |b: SchemaBuilder| {
            keys.iter()
                .fold(b, |b, (name, ty)| b.include(name.clone(), SchemaType::Scalar(*ty)))
        };

        let create = with_keys(SchemaBuilder::new(entity.clone()).exclude(managed.clone()).orm(false)).build()?;
        let update = with_keys(SchemaBuilder::new(entity.clone()).exclude(managed).orm(false))
            .name(format!("{}Update", entity.name))
            .build()?;
        let response = with_keys(SchemaBuilder::new(entity.clone())).build()?;
        Ok(CrudResource::new(CrudService::new(entity), create, update).with_response_schema(response))
    }
}

/// Which routes to register, under which suffix, behind which permission gates.
#[derive(Clone)]
pub struct CrudRouteOptions {
    pub get_all: bool,
    pub get_one: bool,
    pub post_one: bool,
    pub put_one: bool,
    pub delete_one: bool,
    pub path_suffix: String,
    pub max_limit: u64,
    pub permissions: HashMap<Operation, PermissionGate>,
}

impl Default for CrudRouteOptions {
    fn default() -> Self {
        CrudRouteOptions {
            get_all: true,
            get_one: true,
            post_one: true,
            put_one: true,
            delete_one: true,
            path_suffix: String::new(),
            max_limit: MAX_LIMIT,
            permissions: HashMap::new(),
        }
    }
}

impl CrudRouteOptions {
    pub fn enabled(&self, op: Operation) -> bool {
        match op {
            Operation::GetAll => self.get_all,
            Operation::GetOne => self.get_one,
            Operation::PostOne => self.post_one,
            Operation::PutOne => self.put_one,
            Operation::DeleteOne => self.delete_one,
        }
    }

    pub fn disable(mut self, op: Operation) -> Self {
        match op {
            Operation::GetAll => self.get_all = false,
            Operation::GetOne => self.get_one = false,
            Operation::PostOne => self.post_one = false,
            Operation::PutOne => self.put_one = false,
            Operation::DeleteOne => self.delete_one = false,
        }
        self
    }

    pub fn path_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.path_suffix = suffix.into();
        self
    }

    /// Largest accepted `limit`; at least 1.
    pub fn max_limit(mut self, max_limit: u64) -> Self {
        self.max_limit = max_limit.max(1);
        self
    }

    pub fn permissions(mut self, op: Operation, gate: PermissionGate) -> Self {
        self.permissions.insert(op, gate);
        self
    }

    /// Same gate on every operation.
    pub fn permissions_all(mut self, gate: PermissionGate) -> Self {
        for op in [
            Operation::GetAll,
            Operation::GetOne,
            Operation::PostOne,
            Operation::PutOne,
            Operation::DeleteOne,
        ] {
            self.permissions.insert(op, gate.clone());
        }
        self
    }
}

/// State shared by one resource's handlers.
#[derive(Clone)]
pub struct ResourceState {
    pub store: Arc<dyn Store>,
    pub resource: Arc<CrudResource>,
    pub max_limit: u64,
}

fn gated(route: MethodRouter<ResourceState>, gate: Option<&PermissionGate>) -> MethodRouter<ResourceState> {
    match gate {
        Some(gate) if !gate.is_empty() => route.route_layer(from_fn_with_state(gate.clone(), enforce)),
        _ => route,
    }
}

/// Add the enabled routes for `resource` under `prefix` to `router`.
///
/// | route | method | path |
/// |---|---|---|
/// | get_all | GET | `{prefix}{suffix}` |
/// | get_one | GET | `{prefix}/:id{suffix}` |
/// | post_one | POST | `{prefix}{suffix}` |
/// | put_one | PUT | `{prefix}/:id{suffix}` |
/// | delete_one | DELETE | `{prefix}/:id{suffix}` |
pub fn add_crud_routes(
    router: Router,
    prefix: &str,
    store: Arc<dyn Store>,
    resource: CrudResource,
    options: &CrudRouteOptions,
) -> Router {
    let prefix = prefix.trim_end_matches('/');
    let suffix = options.path_suffix.as_str();
    let collection_path = match format!("{}{}", prefix, suffix) {
        p if p.is_empty() => "/".to_string(),
        p => p,
    };
    let item_path = format!("{}/:id{}", prefix, suffix);

    let mut collection: Option<MethodRouter<ResourceState>> = None;
    let mut item: Option<MethodRouter<ResourceState>> = None;
    let routes = [
        (Operation::GetAll, get(handlers::get_all), false),
        (Operation::PostOne, post(handlers::post_one), false),
        (Operation::GetOne, get(handlers::get_one), true),
        (Operation::PutOne, put(handlers::put_one), true),
        (Operation::DeleteOne, delete(handlers::delete_one), true),
    ];
    for (op, route, on_item) in routes {
        if !options.enabled(op) {
            continue;
        }
        let route = gated(route, options.permissions.get(&op));
        let slot = if on_item { &mut item } else { &mut collection };
        *slot = Some(match slot.take() {
            Some(existing) => existing.merge(route),
            None => route,
        });
    }

    tracing::info!(
        entity = %resource.service.entity().name,
        path = %collection_path,
        "registered crud routes"
    );
    let state = ResourceState {
        store,
        resource: Arc::new(resource),
        max_limit: options.max_limit,
    };
    let mut sub = Router::new();
    if let Some(collection) = collection {
        sub = sub.route(&collection_path, collection);
    }
    if let Some(item) = item {
        sub = sub.route(&item_path, item);
    }
    router.merge(sub.with_state(state))
}
