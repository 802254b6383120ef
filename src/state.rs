//! Shared application state for the common and resource routes.

use crate::config::{ResolvedModel, Settings};
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub model: Arc<ResolvedModel>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, model: ResolvedModel, settings: Settings) -> Self {
        AppState {
            store,
            model: Arc::new(model),
            settings: Arc::new(settings),
        }
    }
}
