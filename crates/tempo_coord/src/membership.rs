//! Cluster membership bootstrap: the seeds endpoint client.
//!
//! Cluster formation itself is out of scope; the coordinator only consumes a
//! seeds endpoint returning `{"members": ["host:port", ...]}` and the
//! `ShardEvent`/`CurrentShardSnapshot` stream delivered into router
//! mailboxes.

use std::time::{Duration, Instant};

use serde::Deserialize;

use tempo_common::types::NodeAddress;
use tempo_common::{ClusterError, TempoResult};

const POLL_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Deserialize)]
struct SeedsResponse {
    #[serde(default)]
    members: Vec<String>,
}

fn normalize(members: Vec<String>) -> Vec<NodeAddress> {
    let mut members: Vec<NodeAddress> = members.into_iter().map(NodeAddress).collect();
    members.sort();
    members
}

pub struct SeedsClient {
    client: reqwest::Client,
    url: String,
}

impl SeedsClient {
    pub fn new(url: impl Into<String>) -> Self {
        SeedsClient {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// One fetch of the member list, sorted lexicographically. The list may
    /// be empty if no cluster has formed yet.
    pub async fn fetch(&self) -> TempoResult<Vec<NodeAddress>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ClusterError::Membership(format!("seeds fetch failed: {e}")))?;
        let body: SeedsResponse = response
            .json()
            .await
            .map_err(|e| ClusterError::Membership(format!("seeds response malformed: {e}")))?;
        Ok(normalize(body.members))
    }

    /// Poll the seeds endpoint until it yields a non-empty member list or
    /// the bootstrap timeout elapses.
    pub async fn await_members(&self, timeout_secs: u64) -> TempoResult<Vec<NodeAddress>> {
        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            match self.fetch().await {
                Ok(members) if !members.is_empty() => return Ok(members),
                Ok(_) => tracing::debug!("seeds endpoint returned no members yet"),
                Err(e) => tracing::debug!("seeds fetch failed, will retry: {}", e),
            }
            if Instant::now() >= deadline {
                return Err(ClusterError::SeedsTimeout(timeout_secs).into());
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_parse_and_sort() {
        let body: SeedsResponse =
            serde_json::from_str(r#"{"members": ["node-2:8060", "node-1:8060"]}"#).unwrap();
        let members = normalize(body.members);
        assert_eq!(
            members,
            vec![
                NodeAddress::new("node-1:8060"),
                NodeAddress::new("node-2:8060")
            ]
        );
    }

    #[test]
    fn test_missing_members_field_is_empty() {
        let body: SeedsResponse = serde_json::from_str("{}").unwrap();
        assert!(normalize(body.members).is_empty());
    }
}
