//! HTTP handlers for the generated CRUD routes.

pub mod crud;
pub use crud::*;
