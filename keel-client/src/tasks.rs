//! Task placement endpoints

use crate::ResourceManagerClient;
use crate::error::Result;
use keel_core::dto::resmgr::{
    KillTasksRequest, KillTasksResponse, MarkTasksLaunchedRequest, MarkTasksLaunchedResponse,
};

impl ResourceManagerClient {
    /// Tell the resource manager these tasks were launched on a worker
    ///
    /// Idempotent: acknowledging the same task twice has no further effect.
    pub async fn mark_tasks_launched(
        &self,
        req: &MarkTasksLaunchedRequest,
    ) -> Result<MarkTasksLaunchedResponse> {
        let url = format!("{}/api/v1/tasks/launched", self.base_url);
        tracing::debug!("Marking {} task(s) launched", req.tasks.len());

        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Ask the resource manager to drop placements and stop the given tasks
    pub async fn kill_tasks(&self, req: &KillTasksRequest) -> Result<KillTasksResponse> {
        let url = format!("{}/api/v1/tasks/kill", self.base_url);
        tracing::debug!("Killing {} task(s)", req.tasks.len());

        let response = self.client.post(&url).json(req).send().await?;

        self.handle_response(response).await
    }
}
