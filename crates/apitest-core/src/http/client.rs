use std::time::Duration;

use async_trait::async_trait;

use crate::error::{ApitestError, TransportError};
use crate::http::request::RequestTask;
use crate::http::transport::{Delivery, Transport};

/// Wrapper around a reqwest Client with builder-pattern configuration and
/// connection-pool settings.
pub struct HttpClient {
    inner: reqwest::Client,
}

/// Builder for [`HttpClient`].
pub struct HttpClientBuilder {
    timeout: Duration,
    pool_max_idle_per_host: usize,
    pool_idle_timeout: Duration,
    user_agent: String,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            pool_max_idle_per_host: 10,
            pool_idle_timeout: Duration::from_secs(90),
            user_agent: format!("apitest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Idle connections kept per host. Size this to the run's concurrency so
    /// every worker can reuse a connection.
    pub fn pool_max_idle_per_host(mut self, n: usize) -> Self {
        self.pool_max_idle_per_host = n;
        self
    }

    pub fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_idle_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = ua.into();
        self
    }

    pub fn build(self) -> Result<HttpClient, ApitestError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .pool_idle_timeout(self.pool_idle_timeout)
            .user_agent(self.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(HttpClient { inner: client })
    }
}

impl HttpClient {
    /// Returns a builder for customising the client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }
}

#[async_trait]
impl Transport for HttpClient {
    /// Send the task and drain the response body chunk by chunk, counting
    /// bytes. The body is discarded so the connection goes back to the pool.
    async fn send(&self, task: &RequestTask) -> Delivery {
        let mut builder = self
            .inner
            .request(task.method().as_reqwest(), task.url().clone());

        for (name, value) in task.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(body) = task.body() {
            builder = builder.body(body.to_vec());
        }

        let mut response = match builder.send().await {
            Ok(response) => response,
            Err(e) => return Delivery::failed(TransportError::from_send(&e)),
        };

        let status = response.status().as_u16();
        let mut bytes = 0u64;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => bytes += chunk.len() as u64,
                Ok(None) => break,
                Err(e) => {
                    return Delivery {
                        status: Some(status),
                        bytes,
                        error: Some(TransportError::from_body(&e)),
                    }
                }
            }
        }

        Delivery::response(status, bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::HttpMethod;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve `responses` raw HTTP responses, one per accepted connection, and
    /// return the captured request heads.
    async fn serve_raw(
        responses: Vec<Vec<u8>>,
    ) -> (String, tokio::task::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            let mut seen = Vec::new();
            for response in responses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = vec![0u8; 8192];
                let n = socket.read(&mut buf).await.unwrap();
                seen.push(String::from_utf8_lossy(&buf[..n]).into_owned());
                socket.write_all(&response).await.unwrap();
                socket.shutdown().await.ok();
            }
            seen
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn builder_default_builds_successfully() {
        let client = HttpClientBuilder::default().build();
        assert!(client.is_ok());
    }

    #[test]
    fn builder_chaining_all_options() {
        let client = HttpClient::builder()
            .timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(30))
            .user_agent("apitest-test")
            .build();
        assert!(client.is_ok());
    }

    #[test]
    fn default_builder_has_expected_values() {
        let builder = HttpClientBuilder::default();
        assert_eq!(builder.timeout, Duration::from_secs(30));
        assert_eq!(builder.pool_max_idle_per_host, 10);
        assert_eq!(builder.pool_idle_timeout, Duration::from_secs(90));
        assert!(builder.user_agent.starts_with("apitest/"));
    }

    #[tokio::test]
    async fn send_counts_drained_body_bytes() {
        let (base, server) = serve_raw(vec![
            b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nhello world".to_vec(),
        ])
        .await;
        let client = HttpClient::builder().build().unwrap();
        let task = RequestTask::get(&format!("{base}/ok")).unwrap();

        let delivery = client.send(&task).await;

        assert_eq!(delivery, Delivery::response(200, 11));
        let seen = server.await.unwrap();
        assert!(seen[0].starts_with("GET /ok HTTP/1.1"));
    }

    #[tokio::test]
    async fn send_tolerates_empty_body() {
        let (base, server) = serve_raw(vec![
            b"HTTP/1.1 204 No Content\r\nConnection: close\r\n\r\n".to_vec(),
        ])
        .await;
        let client = HttpClient::builder().build().unwrap();
        let task = RequestTask::get(&base).unwrap();

        let delivery = client.send(&task).await;

        assert_eq!(delivery, Delivery::response(204, 0));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn send_reports_error_status_without_transport_error() {
        let (base, server) = serve_raw(vec![
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found".to_vec(),
        ])
        .await;
        let client = HttpClient::builder().build().unwrap();
        let task = RequestTask::get(&base).unwrap();

        let delivery = client.send(&task).await;

        assert_eq!(delivery.status, Some(404));
        assert_eq!(delivery.bytes, 9);
        assert!(delivery.error.is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn truncated_body_keeps_partial_byte_count() {
        let (base, server) = serve_raw(vec![
            b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\nConnection: close\r\n\r\npartial".to_vec(),
        ])
        .await;
        let client = HttpClient::builder().build().unwrap();
        let task = RequestTask::get(&base).unwrap();

        let delivery = client.send(&task).await;

        assert_eq!(delivery.status, Some(200));
        assert_eq!(delivery.bytes, 7);
        assert!(matches!(delivery.error, Some(TransportError::Body(_))));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn sends_headers_and_body() {
        let (base, server) = serve_raw(vec![
            b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_vec(),
        ])
        .await;
        let client = HttpClient::builder().build().unwrap();
        let task = RequestTask::new(HttpMethod::Post, &format!("{base}/items"))
            .unwrap()
            .with_header("X-Trace", "abc")
            .unwrap()
            .with_body("payload");

        let delivery = client.send(&task).await;

        assert_eq!(delivery.status, Some(201));
        let seen = server.await.unwrap();
        let head = seen[0].to_ascii_lowercase();
        assert!(head.starts_with("post /items http/1.1"));
        assert!(head.contains("x-trace: abc"));
        assert!(head.contains("content-length: 7"));
    }

    #[tokio::test]
    async fn connection_refused_is_a_failed_delivery() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = HttpClient::builder().build().unwrap();
        let task = RequestTask::get(&format!("http://{addr}/")).unwrap();

        let delivery = client.send(&task).await;

        assert!(delivery.status.is_none());
        assert_eq!(delivery.bytes, 0);
        assert!(delivery.error.is_some());
    }
}
