//! Statistics service

use std::sync::Arc;

use crate::{error::AppResult, models::member::MemberActivity, repository::LoanStore};

/// Number of members returned by the top-active ranking when no limit is given
pub const DEFAULT_TOP_ACTIVE: i64 = 5;
pub const MAX_TOP_ACTIVE: i64 = 50;

#[derive(Clone)]
pub struct StatsService {
    store: Arc<dyn LoanStore>,
}

impl StatsService {
    pub fn new(store: Arc<dyn LoanStore>) -> Self {
        Self { store }
    }

    /// Members with the most active loans, most active first.
    ///
    /// Members without active loans are left out; equal counts are ordered by id.
    pub async fn top_active_members(&self, limit: Option<i64>) -> AppResult<Vec<MemberActivity>> {
        let limit = limit.unwrap_or(DEFAULT_TOP_ACTIVE).clamp(1, MAX_TOP_ACTIVE);
        self.store.top_active_members(limit).await
    }
}
