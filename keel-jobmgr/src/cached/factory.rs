//! Registry of resident jobs

use keel_core::domain::job::JobId;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::CachedJob;
use crate::repository::Stores;

/// Owns every resident [`CachedJob`]
///
/// The map lock is only held to look up or insert a handle, never across an
/// await.
pub struct JobFactory {
    jobs: RwLock<HashMap<JobId, Arc<CachedJob>>>,
    stores: Arc<Stores>,
}

impl JobFactory {
    pub fn new(stores: Arc<Stores>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            stores,
        }
    }

    /// Returns the resident job, inserting an empty record if absent
    pub fn add_job(&self, id: JobId) -> Arc<CachedJob> {
        if let Some(job) = self.jobs.read().get(&id) {
            return Arc::clone(job);
        }

        let mut jobs = self.jobs.write();
        Arc::clone(
            jobs.entry(id)
                .or_insert_with(|| Arc::new(CachedJob::new(id, Arc::clone(&self.stores)))),
        )
    }

    pub fn get_job(&self, id: JobId) -> Option<Arc<CachedJob>> {
        self.jobs.read().get(&id).cloned()
    }

    /// Evicts a job. Handles already held elsewhere stay usable.
    pub fn clear_job(&self, id: JobId) {
        self.jobs.write().remove(&id);
    }

    pub fn get_all_jobs(&self) -> Vec<Arc<CachedJob>> {
        self.jobs.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use std::time::Duration;

    fn factory() -> JobFactory {
        let store = Arc::new(MemoryStore::new());
        JobFactory::new(Arc::new(Stores::new(
            store.clone(),
            store,
            Duration::from_secs(1),
        )))
    }

    #[test]
    fn test_add_job_returns_existing_record() {
        let factory = factory();
        let id = JobId::new();

        let first = factory.add_job(id);
        let second = factory.add_job(id);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(factory.get_all_jobs().len(), 1);
    }

    #[test]
    fn test_clear_job_evicts() {
        let factory = factory();
        let id = JobId::new();
        factory.add_job(id);

        factory.clear_job(id);

        assert!(factory.get_job(id).is_none());
        assert!(factory.get_all_jobs().is_empty());
    }
}
