//! Health Check API Handler
//!
//! Liveness endpoint reporting the depth and action counters of both goal
//! state engines.

use axum::{Json, extract::State};
use serde::Serialize;
use std::sync::Arc;

use crate::goalstate::Driver;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub job_queue_length: usize,
    pub task_queue_length: usize,
    pub job_runs: u64,
    pub job_failures: u64,
    pub task_runs: u64,
    pub task_failures: u64,
}

/// GET /health
pub async fn health_check(State(driver): State<Arc<Driver>>) -> Json<HealthResponse> {
    let (job_runs, job_failures) = driver.job_action_counts();
    let (task_runs, task_failures) = driver.task_action_counts();
    Json(HealthResponse {
        status: "ok",
        job_queue_length: driver.job_queue_length(),
        task_queue_length: driver.task_queue_length(),
        job_runs,
        job_failures,
        task_runs,
        task_failures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Harness;
    use keel_core::domain::job::JobId;
    use keel_core::domain::task::TaskId;
    use std::time::Duration;

    #[tokio::test]
    async fn test_health_reports_queue_lengths() {
        let h = Harness::new();
        let job_id = JobId::new();
        h.driver.enqueue_job(job_id, Duration::from_secs(30));
        h.driver.enqueue_task(TaskId::new(job_id, 0), Duration::from_secs(30));
        h.driver.enqueue_task(TaskId::new(job_id, 1), Duration::from_secs(30));

        let Json(response) = health_check(State(Arc::clone(&h.driver))).await;

        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["job_queue_length"], 1);
        assert_eq!(body["task_queue_length"], 2);
        assert_eq!(body["job_runs"], 0);
        assert_eq!(body["task_failures"], 0);
    }
}
