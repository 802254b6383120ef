//! Request extractors.

pub mod user;
pub use user::{user_from_headers, CurrentUser};
