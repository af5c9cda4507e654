//! Resource endpoints under `/api/resources`.

use serde::Deserialize;
use tracing::debug;

use super::client::ApiClient;
use super::error::{ApiError, Result};
use super::request::ApiRequest;
use crate::models::{NewResource, Resource, ResourceQuery};

const RESOURCES_PATH: &str = "/api/resources";

/// Lists come back either bare or wrapped in `{"resources": [...]}`
#[derive(Deserialize)]
#[serde(untagged)]
enum ResourceList {
    Bare(Vec<Resource>),
    Wrapped { resources: Vec<Resource> },
}

impl ResourceList {
    fn into_vec(self) -> Vec<Resource> {
        match self {
            ResourceList::Bare(resources) | ResourceList::Wrapped { resources } => resources,
        }
    }
}

impl ApiClient {
    /// Fetch resources, sorted and limited by the backend
    pub async fn list_resources(&self, query: &ResourceQuery) -> Result<Vec<Resource>> {
        let request = ApiRequest::get(RESOURCES_PATH).query(query.to_pairs());
        let resources = self.send::<ResourceList>(request).await?.into_vec();
        debug!(count = resources.len(), "Fetched resources");
        Ok(resources)
    }

    /// Fetch a single resource by id
    pub async fn get_resource(&self, id: &str) -> Result<Resource> {
        let id = id.trim();
        if id.is_empty() {
            return Err(ApiError::Validation("Resource id is required".to_string()));
        }
        let path = format!("{}/{}", RESOURCES_PATH, urlencoding::encode(id));
        self.send(ApiRequest::get(path)).await
    }

    pub async fn create_resource(&self, resource: &NewResource) -> Result<Resource> {
        if resource.title.trim().is_empty() {
            return Err(ApiError::Validation("Title is required".to_string()));
        }
        self.send(ApiRequest::post(RESOURCES_PATH).json(resource)?).await
    }
}
