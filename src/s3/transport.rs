//! HTTP transport collaborator
//!
//! The signing core and the multipart orchestrator never talk to the
//! network directly; they hand fully signed requests to a [`Transport`].
//! Production uses [`HyperTransport`]; tests inject scripted
//! implementations to drive failure paths deterministically.

use crate::s3::error::{Result, S3Error};
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::HeaderMap;
use hyper::{Method, Request, StatusCode};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client as HyperClient;
use hyper_util::rt::TokioExecutor;
use native_tls::TlsConnector;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

/// Raw response handed back by a transport
pub struct TransportReply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// One blocking-request-per-call transport.
///
/// A call runs to completion or failure; there is no cancellation point
/// once the body has been handed over, and no retry at this layer.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        method: Method,
        url: String,
        headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> impl Future<Output = Result<TransportReply>> + Send;
}

/// hyper 1.x transport with a tuned connection pool
///
/// HTTP/1.1 only, TCP_NODELAY, 90s keepalive and idle timeout, native-tls.
pub struct HyperTransport {
    client: HyperClient<HttpsConnector<HttpConnector>, Full<Bytes>>,
    /// Per-call bound; `Duration::ZERO` means no bound
    timeout: Duration,
}

impl HyperTransport {
    /// Build a transport. `insecure_tls` disables certificate checks for
    /// self-signed test endpoints.
    pub fn new(timeout: Duration, insecure_tls: bool) -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.enforce_http(false);
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.set_keepalive(Some(Duration::from_secs(90)));

        let tls = if insecure_tls {
            tracing::warn!("insecure TLS mode enabled: certificate verification is disabled");
            TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()
                .expect("Failed to build TLS connector")
        } else {
            TlsConnector::new().expect("Failed to build TLS connector")
        };

        let https = HttpsConnector::from((http, tls.into()));

        let client = HyperClient::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(1024)
            .set_host(true)
            .build(https);

        Self { client, timeout }
    }

    /// Replace the per-call timeout; `Duration::ZERO` removes the bound.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn dispatch(
        &self,
        method: Method,
        url: String,
        headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> Result<TransportReply> {
        let mut builder = Request::builder().method(method).uri(&url);
        for (name, value) in &headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(Full::new(body))?;

        let response = if self.timeout.is_zero() {
            self.client
                .request(request)
                .await
                .map_err(|e| S3Error::Transport(format!("request failed: {}", e)))?
        } else {
            tokio::time::timeout(self.timeout, self.client.request(request))
                .await
                .map_err(|_| S3Error::Timeout(self.timeout))?
                .map_err(|e| S3Error::Transport(format!("request failed: {}", e)))?
        };

        let status = response.status();
        let resp_headers = response.headers().clone();
        let body = response
            .collect()
            .await
            .map_err(|e| S3Error::Transport(format!("body error: {}", e)))?
            .to_bytes();

        Ok(TransportReply {
            status,
            headers: resp_headers,
            body,
        })
    }
}

impl Transport for HyperTransport {
    fn send(
        &self,
        method: Method,
        url: String,
        headers: BTreeMap<String, String>,
        body: Bytes,
    ) -> impl Future<Output = Result<TransportReply>> + Send {
        self.dispatch(method, url, headers, body)
    }
}
