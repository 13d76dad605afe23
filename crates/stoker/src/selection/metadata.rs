//! Instance type detection through the EC2 instance metadata service.

use std::time::Duration;
use tracing::{debug, info};
use super::InstanceHints;

const METADATA_BASE: &str = "http://169.254.169.254/latest";
const TOKEN_TTL_HEADER: &str = "X-aws-ec2-metadata-token-ttl-seconds";
const TOKEN_HEADER: &str = "X-aws-ec2-metadata-token";

/// Ask the metadata service for the current instance type.
///
/// Every failure (not on EC2, endpoint unreachable, timeout) yields `None`;
/// hints are advisory and their absence is never an error.
pub async fn detect_instance_hints(timeout: Duration) -> Option<InstanceHints> {
    fetch_instance_hints(METADATA_BASE, timeout).await
}

async fn fetch_instance_hints(base: &str, timeout: Duration) -> Option<InstanceHints> {
    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;

    // IMDSv2 first, falling back to the unauthenticated v1 endpoint
    let token = match client
        .put(format!("{base}/api/token"))
        .header(TOKEN_TTL_HEADER, "60")
        .send()
        .await
    {
        Ok(resp) if resp.status().is_success() => resp.text().await.ok(),
        Ok(resp) => {
            debug!(status = %resp.status(), "metadata token request rejected");
            None
        }
        Err(err) => {
            debug!(error = %err, "instance metadata service unreachable");
            return None;
        }
    };

    let mut request = client.get(format!("{base}/meta-data/instance-type"));
    if let Some(token) = token.as_deref() {
        request = request.header(TOKEN_HEADER, token);
    }

    let response = request.send().await.ok()?;
    if !response.status().is_success() {
        debug!(status = %response.status(), "instance type not reported");
        return None;
    }
    let instance_type = response.text().await.ok()?;
    if instance_type.trim().is_empty() {
        return None;
    }

    let hints = InstanceHints::new(instance_type);
    info!(instance_type = %hints.instance_type, "detected cloud instance type");
    Some(hints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TIMEOUT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_reads_instance_type_with_session_token() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/token"))
            .and(header(TOKEN_TTL_HEADER, "60"))
            .respond_with(ResponseTemplate::new(200).set_body_string("session"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/meta-data/instance-type"))
            .and(header(TOKEN_HEADER, "session"))
            .respond_with(ResponseTemplate::new(200).set_body_string("g5.xlarge"))
            .mount(&server)
            .await;

        let hints = fetch_instance_hints(&server.uri(), TIMEOUT).await.unwrap();
        assert_eq!(hints.instance_type, "g5.xlarge");
    }

    #[tokio::test]
    async fn test_rejected_token_falls_back_to_v1() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/meta-data/instance-type"))
            .respond_with(ResponseTemplate::new(200).set_body_string("p3.2xlarge\n"))
            .mount(&server)
            .await;

        let hints = fetch_instance_hints(&server.uri(), TIMEOUT).await.unwrap();
        assert_eq!(hints.instance_type, "p3.2xlarge");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_yields_none() {
        // bind then release a port so nothing is listening on it
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();

        assert!(fetch_instance_hints(&format!("http://127.0.0.1:{port}"), TIMEOUT).await.is_none());
    }

    #[tokio::test]
    async fn test_slow_endpoint_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_string("session").set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let started = std::time::Instant::now();
        assert!(fetch_instance_hints(&server.uri(), TIMEOUT).await.is_none());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_instance_type_yields_none() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200).set_body_string("session"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        assert!(fetch_instance_hints(&server.uri(), TIMEOUT).await.is_none());
    }
}
