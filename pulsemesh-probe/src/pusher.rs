//! HTTP delivery of sample batches to the control plane.

use std::time::Duration;

use reqwest::Client;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::models::{PushPayload, Sample};

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("endpoint returned status {0}")]
    Status(u16),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

pub struct Pusher {
    client: Client,
    endpoint: String,
    node_id: String,
    region: String,
    role: String,
}

impl Pusher {
    pub fn new(config: &ProbeConfig) -> Result<Self, PushError> {
        let client = Client::builder().timeout(PUSH_TIMEOUT).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            node_id: config.node_id.clone(),
            region: config.region.clone(),
            role: config.role.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one batch. Any non-2xx status counts as a failure so the
    /// caller requeues the batch.
    pub async fn push(&self, batch: &[Sample]) -> Result<(), PushError> {
        let payload = PushPayload {
            node_id: &self.node_id,
            region: &self.region,
            role: &self.role,
            batch,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PushError::Status(response.status().as_u16()));
        }
        debug!("endpoint acknowledged {} samples", batch.len());
        Ok(())
    }
}
