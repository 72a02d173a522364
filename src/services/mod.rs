//! Business logic services

pub mod catalog;
pub mod email;
pub mod loans;
pub mod members;
pub mod notifications;
pub mod overdue;
pub mod redis;
pub mod stats;

use std::sync::Arc;

use crate::{
    config::LoansConfig,
    repository::{LoanStore, Repository},
};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub catalog: catalog::CatalogService,
    pub members: members::MembersService,
    pub loans: loans::LoansService,
    pub loan_queries: loans::LoanQueries,
    pub stats: stats::StatsService,
    pub redis: redis::RedisNotificationQueue,
    store: Arc<dyn LoanStore>,
    repository: Repository,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(repository: Repository, queue: redis::RedisNotificationQueue, loans_config: LoansConfig) -> Self {
        let store: Arc<dyn LoanStore> = Arc::new(repository.loans.clone());
        let notifications: Arc<dyn notifications::NotificationQueue> = Arc::new(queue.clone());

        Self {
            catalog: catalog::CatalogService::new(repository.clone()),
            members: members::MembersService::new(repository.clone()),
            loans: loans::LoansService::new(store.clone(), notifications, loans_config),
            loan_queries: loans::LoanQueries::new(repository.clone()),
            stats: stats::StatsService::new(store.clone()),
            redis: queue,
            store,
            repository,
        }
    }

    /// Transactional lending store shared by the services and background jobs
    pub fn loan_store(&self) -> Arc<dyn LoanStore> {
        self.store.clone()
    }

    pub fn repository(&self) -> &Repository {
        &self.repository
    }
}
