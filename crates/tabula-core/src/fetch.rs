//! Download of dataset sources given by URL.

use std::time::Duration;

use tabula_protocol::MAX_MESSAGE_SIZE;
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Fetch `url` into memory, giving up after `timeout`.
///
/// A non-success status is an error, as is a body larger than
/// [`MAX_MESSAGE_SIZE`], the most a single RPC frame can carry.
pub async fn fetch_url(url: &str, timeout: Duration) -> CoreResult<Vec<u8>> {
    fetch_url_limited(url, timeout, MAX_MESSAGE_SIZE).await
}

async fn fetch_url_limited(url: &str, timeout: Duration, max: usize) -> CoreResult<Vec<u8>> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(CoreError::stage("error fetching url"))?;
    let mut res = client
        .get(url)
        .send()
        .await
        .and_then(|res| res.error_for_status())
        .map_err(CoreError::stage("error fetching url"))?;

    let too_large =
        || CoreError::stage("error reading file")(format!("response exceeds {max} bytes"));
    if res.content_length().is_some_and(|len| len > max as u64) {
        return Err(too_large());
    }
    let mut body = Vec::new();
    while let Some(chunk) = res
        .chunk()
        .await
        .map_err(CoreError::stage("error reading file"))?
    {
        if body.len() + chunk.len() > max {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    debug!(url, bytes = body.len(), "fetched url");
    Ok(body)
}

/// The last path segment of a URL, ignoring query and fragment.
pub fn url_filename(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end]
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Serve one canned HTTP response per connection and return the base URL.
#[cfg(test)]
pub(crate) async fn serve_once(status: &'static str, body: &'static str) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut sock, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let reply = format!(
                "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = sock.write_all(reply.as_bytes()).await;
        }
    });
    format!("http://{addr}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn filename_from_url() {
        assert_eq!(url_filename("https://example.com/data/jobs.csv"), "jobs.csv");
        assert_eq!(url_filename("https://example.com/data/jobs.csv?dl=1#top"), "jobs.csv");
        assert_eq!(url_filename("https://example.com/data/"), "data");
        assert_eq!(url_filename("jobs.csv"), "jobs.csv");
    }

    #[tokio::test]
    async fn fetches_body() {
        let base = serve_once("200 OK", "a,b\n1,2\n").await;
        let body = fetch_url(&format!("{base}/file.csv"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(body, b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn error_status_fails() {
        let base = serve_once("404 Not Found", "").await;
        let err = fetch_url(&format!("{base}/missing.csv"), Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("error fetching url:"), "{err}");
    }

    #[tokio::test]
    async fn declared_length_over_cap_fails() {
        let base = serve_once("200 OK", "a,b\n1,2\n").await;
        let err = fetch_url_limited(&format!("{base}/file.csv"), Duration::from_secs(5), 4)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "error reading file: response exceeds 4 bytes");
    }

    #[tokio::test]
    async fn streamed_body_over_cap_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            // no content-length: the body runs until the connection closes
            let _ = sock
                .write_all(b"HTTP/1.1 200 OK\r\nconnection: close\r\n\r\ncount\n1\n2\n3\n")
                .await;
        });
        let err = fetch_url_limited(&format!("http://{addr}/rows.csv"), Duration::from_secs(5), 8)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "error reading file: response exceeds 8 bytes");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let err = fetch_url(&format!("http://{addr}/slow.csv"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("error fetching url:"), "{err}");
    }
}
