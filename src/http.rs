//! HTTP transport for the completion service.
//!
//! This module provides reqwest client construction and the
//! [`HttpOpener`], which posts a [`CompletionRequest`] and hands back the
//! response body as a byte stream.

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};
use std::collections::HashMap;
use tracing::debug;

use crate::client::{ByteStream, ClientError, TransportOpener};
use crate::model::CompletionRequest;
use crate::options::{HttpTransport, TransportOptions};

/// Build a configured HTTP client from transport options.
///
/// This applies common configuration like timeouts and proxies.
pub fn build_http_client(
    transport_options: &TransportOptions<HttpTransport>,
) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if !transport_options.provider.system_proxy {
        builder = builder.no_proxy();
    }

    if let Some(proxy_url) = &transport_options.provider.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy {proxy_url}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Opens completion streams over HTTP.
///
/// The reqwest client is built once and reused for every session.
#[derive(Debug, Clone)]
pub struct HttpOpener {
    http: Client,
    url: String,
    extra_headers: Option<HashMap<String, String>>,
}

impl HttpOpener {
    /// Create an opener from transport options.
    pub fn new(transport_options: &TransportOptions<HttpTransport>) -> Result<Self, ClientError> {
        let url = transport_options.provider.url();
        reqwest::Url::parse(&url)
            .map_err(|e| ClientError::Config(format!("invalid endpoint URL {url}: {e}")))?;

        Ok(Self {
            http: build_http_client(transport_options)?,
            url,
            extra_headers: transport_options.provider.extra_headers.clone(),
        })
    }

    /// The endpoint this opener posts to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TransportOpener for HttpOpener {
    async fn open(&self, request: &CompletionRequest) -> Result<ByteStream, ClientError> {
        let mut req = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream");

        req = add_extra_headers(req, &self.extra_headers);

        let response = req.json(request).send().await?;
        let status = response.status();
        debug!(url = %self.url, %status, "completion stream opened");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes_stream().map_err(ClientError::from).boxed())
    }
}
