//! HTTP reachability connector for the MCP link.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{McpConnector, McpError};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Treats the MCP server as connected when its URL answers HTTP at all.
///
/// Streamable-HTTP MCP endpoints commonly answer a bare GET with 4xx/405, so
/// any response status counts as reachable; only transport failures do not.
pub struct HttpProbeConnector {
    http: reqwest::Client,
}

impl HttpProbeConnector {
    pub fn new() -> Result<Self, McpError> {
        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| McpError::Unreachable(e.to_string()))?;
        Ok(Self { http })
    }
}

#[async_trait]
impl McpConnector for HttpProbeConnector {
    async fn open(&self, server_url: &str) -> Result<(), McpError> {
        let response = self
            .http
            .get(server_url)
            .send()
            .await
            .map_err(|e| McpError::Unreachable(e.to_string()))?;

        tracing::debug!(
            "MCP probe {} answered with HTTP {}",
            server_url,
            response.status()
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), McpError> {
        // Nothing is held open between probes.
        Ok(())
    }
}
