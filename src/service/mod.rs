//! CrudService: generic data accessor over a storage session.

mod crud;
pub use crud::{CrudService, WriteOptions};
