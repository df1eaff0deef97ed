#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod stream;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{header::CONTENT_TYPE, Client as ReqwestClient, RequestBuilder, StatusCode};
use rest_store::{EventStream, ListOptions, Transport, TransportError, TransportResponse};
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// [`Transport`] speaking to a REST backend over HTTP
pub struct RestTransport {
    client: ReqwestClient,
    /// Watch responses stay open indefinitely, so this one has no total timeout
    stream_client: ReqwestClient,
    base_url: String,
}

impl RestTransport {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = ReqwestClient::builder().timeout(REQUEST_TIMEOUT).build()?;
        let stream_client = ReqwestClient::builder()
            .connect_timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            stream_client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn object_url(&self, kind: &str, namespace: &str, name: &str) -> String {
        format!(
            "{}/namespaces/{}/{}/{}",
            self.base_url, namespace, kind, name
        )
    }

    fn collection_url(&self, kind: &str, namespace: &str) -> String {
        format!("{}/namespaces/{}/{}", self.base_url, namespace, kind)
    }

    fn watch_url(&self, kind: &str, namespace: &str, name: Option<&str>) -> String {
        match name {
            Some(name) => format!(
                "{}/watch/namespaces/{}/{}/{}",
                self.base_url, namespace, kind, name
            ),
            None => format!("{}/watch/namespaces/{}/{}", self.base_url, namespace, kind),
        }
    }

    /// Check if the backend is healthy
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/health", self.base_url);

        let response = self.client.get(&url).send().await?;

        Ok(response.status() == StatusCode::OK)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<TransportResponse, TransportError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let body = response.bytes().await.map_err(transport_error)?;
        debug!(%status, bytes = body.len(), "backend responded");
        Ok(TransportResponse::new(status, body))
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Connection(err.to_string())
    }
}

fn query(options: &ListOptions) -> Vec<(&'static str, &str)> {
    let mut params = Vec::new();
    if let Some(selector) = &options.label_selector {
        params.push(("labelSelector", selector.as_str()));
    }
    if let Some(rv) = &options.resource_version {
        params.push(("resourceVersion", rv.as_str()));
    }
    params
}

#[async_trait]
impl Transport for RestTransport {
    #[instrument(skip(self, body))]
    async fn create(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError> {
        let request = self
            .client
            .post(self.object_url(kind, namespace, name))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.execute(request).await
    }

    #[instrument(skip(self))]
    async fn get(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<TransportResponse, TransportError> {
        self.execute(self.client.get(self.object_url(kind, namespace, name)))
            .await
    }

    #[instrument(skip(self, body))]
    async fn update(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
        body: Bytes,
    ) -> Result<TransportResponse, TransportError> {
        let request = self
            .client
            .put(self.object_url(kind, namespace, name))
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        self.execute(request).await
    }

    #[instrument(skip(self))]
    async fn delete(
        &self,
        kind: &str,
        namespace: &str,
        name: &str,
    ) -> Result<TransportResponse, TransportError> {
        self.execute(self.client.delete(self.object_url(kind, namespace, name)))
            .await
    }

    #[instrument(skip(self))]
    async fn list(
        &self,
        kind: &str,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<TransportResponse, TransportError> {
        let request = self
            .client
            .get(self.collection_url(kind, namespace))
            .query(&query(options));
        self.execute(request).await
    }

    #[instrument(skip(self))]
    async fn watch(
        &self,
        kind: &str,
        namespace: &str,
        name: Option<&str>,
        options: &ListOptions,
    ) -> Result<EventStream, TransportError> {
        let response = self
            .stream_client
            .get(self.watch_url(kind, namespace, name))
            .query(&query(options))
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.map_err(transport_error)?;
            let message = TransportResponse::new(status, body).message();
            return Err(TransportError::Stream(format!(
                "watch rejected with {status}: {message}"
            )));
        }

        debug!("watch stream opened");
        Ok(stream::decode_events(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let transport = RestTransport::new("http://localhost:3000").unwrap();
        assert_eq!(transport.base_url(), "http://localhost:3000");

        // Test trailing slash removal
        let transport = RestTransport::new("http://localhost:3000///").unwrap();
        assert_eq!(transport.base_url(), "http://localhost:3000");
    }

    #[test]
    fn test_url_layout() {
        let transport = RestTransport::new("https://api.example.com/v1/").unwrap();

        assert_eq!(
            transport.object_url("brokers", "default", "b1"),
            "https://api.example.com/v1/namespaces/default/brokers/b1"
        );
        assert_eq!(
            transport.collection_url("serviceinstances", "team-a"),
            "https://api.example.com/v1/namespaces/team-a/serviceinstances"
        );
        assert_eq!(
            transport.watch_url("brokers", "default", None),
            "https://api.example.com/v1/watch/namespaces/default/brokers"
        );
        assert_eq!(
            transport.watch_url("brokers", "default", Some("b1")),
            "https://api.example.com/v1/watch/namespaces/default/brokers/b1"
        );
    }

    #[test]
    fn test_query_skips_unset_options() {
        assert!(query(&ListOptions::default()).is_empty());

        let options = ListOptions {
            label_selector: Some("tier=gold".to_string()),
            resource_version: Some("7".to_string()),
        };
        assert_eq!(
            query(&options),
            vec![("labelSelector", "tier=gold"), ("resourceVersion", "7")]
        );
    }
}
