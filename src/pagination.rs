//! Offset/limit pagination with absolute next/previous links.

use crate::error::AppError;
use crate::response::Page;
use crate::service::CrudService;
use crate::store::{ListQuery, Row, Session, Window};
use axum::http::{header, HeaderMap, HeaderName, Uri};
use std::collections::HashMap;
use url::Url;

pub const DEFAULT_OFFSET: u64 = 0;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

pub const OFFSET_PARAM: &str = "offset";
pub const LIMIT_PARAM: &str = "limit";

const FORWARDED_PROTO: &str = "x-forwarded-proto";

#[derive(Clone, Debug)]
pub struct Pagination {
    url: Url,
    pub offset: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(url: Url, offset: u64, limit: u64) -> Self {
        Pagination { url, offset, limit }
    }

    /// Read `offset` and `limit` from the query string and rebuild the absolute request URL.
    pub fn from_request(
        uri: &Uri,
        headers: &HeaderMap,
        params: &HashMap<String, String>,
        max_limit: u64,
    ) -> Result<Self, AppError> {
        let max_limit = max_limit.max(1);
        let offset = match params.get(OFFSET_PARAM) {
            Some(raw) => parse_bounded(OFFSET_PARAM, raw, 0, None)?,
            None => DEFAULT_OFFSET,
        };
        let limit = match params.get(LIMIT_PARAM) {
            Some(raw) => parse_bounded(LIMIT_PARAM, raw, 1, Some(max_limit))?,
            None => DEFAULT_LIMIT.min(max_limit),
        };
        let url = request_url(uri, headers)?;
        Ok(Pagination::new(url, offset, limit))
    }

    pub fn window(&self) -> Window {
        Window {
            limit: self.limit,
            offset: self.offset,
        }
    }

    /// Link to the following page, or None on the last one.
    pub fn next_url(&self, count: u64) -> Option<String> {
        if self.offset + self.limit >= count {
            return None;
        }
        Some(self.with_params(&[
            (LIMIT_PARAM, self.limit.to_string()),
            (OFFSET_PARAM, (self.offset + self.limit).to_string()),
        ]))
    }

    /// Link to the preceding page, or None on the first one. Drops `offset` when it would reach zero.
    pub fn previous_url(&self) -> Option<String> {
        if self.offset == 0 {
            return None;
        }
        if self.offset <= self.limit {
            return Some(self.without_param(OFFSET_PARAM));
        }
        Some(self.with_params(&[
            (LIMIT_PARAM, self.limit.to_string()),
            (OFFSET_PARAM, (self.offset - self.limit).to_string()),
        ]))
    }

    /// Count `query`, then load rows `[offset, offset + limit)`.
    pub async fn paginate(
        &self,
        session: &mut dyn Session,
        service: &CrudService,
        query: &ListQuery,
    ) -> Result<Page<Row>, AppError> {
        let count = service.count(session, query).await?;
        let data = service.slice(session, query, self.window()).await?;
        Ok(Page {
            count,
            next: self.next_url(count),
            previous: self.previous_url(),
            data,
        })
    }

    /// Current URL with `params` set; replaced keys move to the end of the query.
    fn with_params(&self, params: &[(&str, String)]) -> String {
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| !params.iter().any(|(p, _)| *p == &**k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let mut url = self.url.clone();
        url.query_pairs_mut()
            .clear()
            .extend_pairs(kept)
            .extend_pairs(params.iter().map(|(k, v)| (*k, v.as_str())));
        url.to_string()
    }

    fn without_param(&self, name: &str) -> String {
        let kept: Vec<(String, String)> = self
            .url
            .query_pairs()
            .filter(|(k, _)| &**k != name)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let mut url = self.url.clone();
        if kept.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(kept);
        }
        url.to_string()
    }
}

fn parse_bounded(name: &str, raw: &str, min: u64, max: Option<u64>) -> Result<u64, AppError> {
    let n: i64 = raw
        .trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{} must be an integer", name)))?;
    if n < min as i64 {
        return Err(AppError::Validation(format!("{} must be greater than or equal to {}", name, min)));
    }
    let n = n as u64;
    match max {
        Some(max) if n > max => Err(AppError::Validation(format!("{} must be less than or equal to {}", name, max))),
        _ => Ok(n),
    }
}

fn header_str(headers: &HeaderMap, name: HeaderName) -> Option<&str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// `{proto}://{host}{path}?{query}` from the forwarded scheme, the Host header and the original URI.
fn request_url(uri: &Uri, headers: &HeaderMap) -> Result<Url, AppError> {
    let proto = header_str(headers, HeaderName::from_static(FORWARDED_PROTO)).unwrap_or("http");
    let host = header_str(headers, header::HOST)
        .or_else(|| uri.authority().map(|a| a.as_str()))
        .unwrap_or("localhost");
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let raw = format!("{}://{}{}", proto, host, path_and_query);
    Url::parse(&raw).map_err(|e| AppError::BadRequest(format!("cannot rebuild request url: {}", e)))
}
