// ABOUTME: Minimal HTTP/1.1 GET used by health checks and verification probes.
// ABOUTME: Returns the response status; connection problems and timeouts are errors.

use bytes::Bytes;
use http_body_util::Empty;
use hyper::Uri;
use hyper_util::rt::TokioIo;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;

#[derive(Debug, Error)]
pub enum HttpProbeError {
    #[error("invalid probe url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported scheme in {0}; only http probes are supported")]
    UnsupportedScheme(String),

    #[error("connection to {0} failed: {1}")]
    Connect(String, String),

    #[error("request to {0} failed: {1}")]
    Request(String, String),

    #[error("probe of {0} timed out after {1:?}")]
    Timeout(String, Duration),
}

/// GET `url` and return the status code.
pub async fn get_status(url: &str, timeout: Duration) -> Result<u16, HttpProbeError> {
    let uri: Uri = url.parse().map_err(|e: hyper::http::uri::InvalidUri| {
        HttpProbeError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        }
    })?;

    match uri.scheme_str() {
        Some("http") | None => {}
        Some(_) => return Err(HttpProbeError::UnsupportedScheme(url.to_string())),
    }

    let host = uri
        .host()
        .ok_or_else(|| HttpProbeError::InvalidUrl {
            url: url.to_string(),
            reason: "missing host".to_string(),
        })?
        .to_string();
    let port = uri.port_u16().unwrap_or(80);
    let authority = format!("{host}:{port}");
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    let attempt = async {
        let stream = TcpStream::connect(&authority)
            .await
            .map_err(|e| HttpProbeError::Connect(authority.clone(), e.to_string()))?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| HttpProbeError::Connect(authority.clone(), e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.await {
                tracing::debug!(error = %e, "probe connection closed with error");
            }
        });

        let request = hyper::Request::builder()
            .method("GET")
            .uri(&path)
            .header("host", &authority)
            .header("user-agent", concat!("switchyard/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())
            .map_err(|e| HttpProbeError::Request(url.to_string(), e.to_string()))?;

        let response = sender
            .send_request(request)
            .await
            .map_err(|e| HttpProbeError::Request(url.to_string(), e.to_string()))?;

        Ok(response.status().as_u16())
    };

    tokio::time::timeout(timeout, attempt)
        .await
        .map_err(|_| HttpProbeError::Timeout(url.to_string(), timeout))?
}
