//! Response envelopes.

use serde::{Deserialize, Serialize};

/// One page of a listing. `next` and `previous` are absolute URLs, null at either end.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    /// Same page with different items, e.g. after rendering rows through a schema.
    pub fn with_data<U>(self, data: Vec<U>) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            data,
        }
    }
}
