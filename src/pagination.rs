use axum::http::Uri;
use serde::{Deserialize, Serialize};

use crate::error::{AppResult, DBError};

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<String>,
    #[serde(default)]
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub count: i64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// Largest page size a client can ask for.
pub const MAX_LIMIT: i64 = 1000;

/// Page-number pagination: `page` is 1-based, `limit` overrides the page size.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pager {
    pub page: i64,
    pub limit: i64,
}

impl Pager {
    /// An unparsable or non-positive `limit` falls back to the default; an
    /// unparsable `page` is a 404, same as a page past the end.
    pub fn parse(page: Option<&str>, limit: Option<&str>, default_limit: i64) -> AppResult<Self> {
        let page = match page {
            None => 1,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(page) if page >= 1 => page,
                _ => return Err(DBError::NotFound.into()),
            },
        };

        let limit = limit
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .filter(|limit| *limit >= 1)
            .unwrap_or(default_limit)
            .clamp(1, MAX_LIMIT);

        // The end of the requested page must fit in an i64.
        (page - 1)
            .checked_mul(limit)
            .and_then(|offset| offset.checked_add(limit))
            .ok_or(DBError::NotFound)?;

        Ok(Self { page, limit })
    }

    pub fn from_query(query: &PageQuery, default_limit: i64) -> AppResult<Self> {
        Self::parse(query.page.as_deref(), query.limit.as_deref(), default_limit)
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn finish<T>(self, results: Vec<T>, count: i64, uri: &Uri) -> AppResult<Page<T>> {
        if self.page > 1 && self.offset() >= count {
            return Err(DBError::NotFound.into());
        }

        let next = (self.offset().saturating_add(self.limit) < count)
            .then(|| page_link(uri, self.page + 1));
        let previous = (self.page > 1).then(|| page_link(uri, self.page - 1));

        Ok(Page {
            count,
            next,
            previous,
            results,
        })
    }
}

fn page_link(uri: &Uri, page: i64) -> String {
    let mut pairs = uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty() && !pair.starts_with("page="))
        .map(str::to_string)
        .collect::<Vec<_>>();

    if page > 1 {
        pairs.push(format!("page={page}"));
    }

    if pairs.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), pairs.join("&"))
    }
}
