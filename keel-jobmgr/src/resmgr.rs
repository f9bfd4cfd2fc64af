//! Resource manager seam
//!
//! The actions only see the [`ResourceManager`] trait; production wires in
//! the HTTP client from `keel-client`.

use async_trait::async_trait;
use keel_client::ResourceManagerClient;
use keel_core::dto::resmgr::{
    KillTasksRequest, KillTasksResponse, MarkTasksLaunchedRequest, MarkTasksLaunchedResponse,
};

#[async_trait]
pub trait ResourceManager: Send + Sync {
    /// Acknowledges tasks that are known to be launched. Idempotent.
    async fn mark_tasks_launched(
        &self,
        req: MarkTasksLaunchedRequest,
    ) -> keel_client::Result<MarkTasksLaunchedResponse>;

    async fn kill_tasks(&self, req: KillTasksRequest) -> keel_client::Result<KillTasksResponse>;
}

#[async_trait]
impl ResourceManager for ResourceManagerClient {
    async fn mark_tasks_launched(
        &self,
        req: MarkTasksLaunchedRequest,
    ) -> keel_client::Result<MarkTasksLaunchedResponse> {
        ResourceManagerClient::mark_tasks_launched(self, &req).await
    }

    async fn kill_tasks(&self, req: KillTasksRequest) -> keel_client::Result<KillTasksResponse> {
        ResourceManagerClient::kill_tasks(self, &req).await
    }
}
