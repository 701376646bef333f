use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::mesh::{AgentRecord, MemoryRecord, MessageRecord};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}")]
    Status { url: String, status: StatusCode },
    #[error("could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("feed source unavailable: {0}")]
    Unavailable(String),
}

/// Where roster and history snapshots come from.
pub trait SnapshotSource: Send + Sync {
    fn fetch_agents(&self) -> Result<Vec<AgentRecord>, FeedError>;
    fn fetch_messages(&self, limit: usize) -> Result<Vec<MessageRecord>, FeedError>;
    /// Knowledge entries stored for one agent. Fetched on demand, not polled.
    fn fetch_memories(&self, agent_id: &str) -> Result<Vec<MemoryRecord>, FeedError>;
}

pub struct HttpSource {
    client: Client,
    base_url: String,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for mesh feeds")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    fn ensure_base_url(&self) -> Result<(), FeedError> {
        if self.base_url.is_empty() {
            return Err(FeedError::Unavailable("no feed base URL configured".to_owned()));
        }
        Ok(())
    }

    /// `<base>/api/memory/<agent id>` with the id escaped as a single path segment.
    fn memory_url(&self, agent_id: &str) -> Result<String, FeedError> {
        self.ensure_base_url()?;
        let mut url = Url::parse(&self.base_url)
            .map_err(|error| FeedError::Unavailable(format!("invalid base URL: {error}")))?;
        url.path_segments_mut()
            .map_err(|()| FeedError::Unavailable("base URL cannot carry a path".to_owned()))?
            .pop_if_empty()
            .extend(["api", "memory", agent_id]);
        Ok(url.into())
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, FeedError> {
        self.ensure_base_url()?;
        self.get_json_url(format!("{}{path}", self.base_url))
    }

    fn get_json_url<T: DeserializeOwned>(&self, url: String) -> Result<T, FeedError> {
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|source| FeedError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status { url, status });
        }

        response
            .json::<T>()
            .map_err(|source| FeedError::Decode { url, source })
    }
}

impl SnapshotSource for HttpSource {
    fn fetch_agents(&self) -> Result<Vec<AgentRecord>, FeedError> {
        self.get_json("/api/agents")
    }

    fn fetch_messages(&self, limit: usize) -> Result<Vec<MessageRecord>, FeedError> {
        self.get_json(&format!("/api/history?limit={limit}"))
    }

    fn fetch_memories(&self, agent_id: &str) -> Result<Vec<MemoryRecord>, FeedError> {
        let url = self.memory_url(agent_id)?;
        self.get_json_url(url)
    }
}
