//! Shared query parameter types for API handlers.

use serde::Deserialize;

/// Largest page a client may request from a list endpoint.
pub const MAX_PAGE_SIZE: usize = 100;

/// Query parameters for `GET /jobs` (`?page=&page_size=&status=`).
///
/// `page` is 1-indexed. Missing or out-of-range values are clamped rather
/// than rejected.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsParams {
    pub page: Option<usize>,
    pub page_size: Option<usize>,
    pub status: Option<String>,
}

impl ListJobsParams {
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(20).clamp(1, MAX_PAGE_SIZE)
    }

    /// Number of items skipped before the current page.
    pub fn offset(&self) -> usize {
        (self.page() - 1).saturating_mul(self.page_size())
    }
}

/// Query parameters for `GET /backends`.
#[derive(Debug, Deserialize)]
pub struct ListBackendsParams {
    #[serde(default)]
    pub available_only: bool,
}
