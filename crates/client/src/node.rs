//! Per-node transport
//!
//! A thin, stateless request/response layer: one authenticated call against
//! one node, with the node-level outcome normalized into `NodeFailure`.
//! "Zero matches" is an `Ok` with an empty list and stays distinguishable
//! from a node that was unreachable or rejected the call. No retries, no
//! sessions, no pending-write queue.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::NodeDescriptor;
use common::record::{Filter, PartialRecord};

pub(crate) const CREATE_PATH: &str = "/api/v1/data/create";
pub(crate) const READ_PATH: &str = "/api/v1/data/read";
pub(crate) const DELETE_PATH: &str = "/api/v1/data/delete";

/// Outcome of one failed node call
#[derive(Debug, thiserror::Error)]
pub enum NodeFailure {
    /// Network-level failure, including timeouts
    #[error("node unreachable: {0}")]
    Unreachable(String),
    /// The node answered with a non-success status
    #[error("node rejected request: status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
}

impl From<reqwest::Error> for NodeFailure {
    fn from(e: reqwest::Error) -> Self {
        NodeFailure::Unreachable(e.to_string())
    }
}

#[derive(Debug, Serialize)]
struct WriteBody<'a> {
    schema: &'a str,
    data: &'a [PartialRecord],
}

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    schema: &'a str,
    filter: &'a Filter,
}

#[derive(Debug, Deserialize)]
struct ReadResponse {
    data: Vec<PartialRecord>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    deleted: u64,
}

/// One authenticated call against one node
pub struct NodeClient<'a> {
    http: &'a reqwest::Client,
    node: &'a NodeDescriptor,
}

impl<'a> NodeClient<'a> {
    pub fn new(http: &'a reqwest::Client, node: &'a NodeDescriptor) -> Self {
        NodeClient { http, node }
    }

    /// Store one partial record under a schema; any 2xx status is success
    pub async fn create(
        &self,
        token: &str,
        schema: &str,
        record: &PartialRecord,
    ) -> Result<(), NodeFailure> {
        let body = WriteBody {
            schema,
            data: std::slice::from_ref(record),
        };
        self.post(CREATE_PATH, token, &body).await?;
        Ok(())
    }

    /// Fetch the partial records matching a filter as seen by this node
    pub async fn read(
        &self,
        token: &str,
        schema: &str,
        filter: &Filter,
    ) -> Result<Vec<PartialRecord>, NodeFailure> {
        let body = QueryBody { schema, filter };
        let response = self.post(READ_PATH, token, &body).await?;
        let parsed = response.json::<ReadResponse>().await?;
        Ok(parsed.data)
    }

    /// Remove the partial records matching a filter from this node
    pub async fn delete(
        &self,
        token: &str,
        schema: &str,
        filter: &Filter,
    ) -> Result<u64, NodeFailure> {
        let body = QueryBody { schema, filter };
        let response = self.post(DELETE_PATH, token, &body).await?;
        let parsed = response.json::<DeleteResponse>().await?;
        Ok(parsed.deleted)
    }

    async fn post<T: Serialize>(
        &self,
        path: &str,
        token: &str,
        body: &T,
    ) -> Result<reqwest::Response, NodeFailure> {
        let url = self
            .node
            .url
            .join(path)
            .map_err(|e| NodeFailure::Unreachable(e.to_string()))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(NodeFailure::Rejected { status, body })
        }
    }
}
