//! HTTP health probes for deployed services.

use std::time::Duration;

use anyhow::Context;
use reqwest::blocking::Client;
use tracing::info;

use crate::error::DeployResult;
use crate::retry::{Attempt, RetryPolicy, retry};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Blocking client for probes. Freshly issued certificates are often
/// self-signed, so verification can be switched off.
pub fn http_client(accept_invalid_certs: bool) -> DeployResult<Client> {
    let client = Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .context("Failed to build HTTP client")?;
    Ok(client)
}

/// `url` answers with a 2xx status.
pub fn check_http_health(
    stage: &str,
    client: &Client,
    url: &str,
    policy: &RetryPolicy,
) -> DeployResult<()> {
    let outcome = retry(policy, |_| match client.get(url).send() {
        Ok(response) if response.status().is_success() => Attempt::Success(response.status()),
        Ok(response) => Attempt::Retry(format!("{url} answered {}", response.status())),
        Err(e) => Attempt::Retry(format!("request to {url} failed: {e}")),
    });
    let status = outcome.into_validation(stage, url)?;
    info!(stage, url, %status, "service healthy");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    /// Serve `responses` one connection at a time, then stop.
    fn serve(responses: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut buf = [0u8; 1024];
                let _ = stream.read(&mut buf);
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        format!("http://{addr}/health")
    }

    const OK: &str = "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok";
    const UNAVAILABLE: &str =
        "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

    #[test]
    fn recovers_after_unavailable_response() {
        let url = serve(vec![UNAVAILABLE, OK]);
        let client = http_client(false).unwrap();

        check_http_health(
            "07-kubernetes-services",
            &client,
            &url,
            &RetryPolicy::fixed(3, Duration::ZERO),
        )
        .unwrap();
    }

    #[test]
    fn persistent_failure_is_validation_error() {
        let url = serve(vec![UNAVAILABLE, UNAVAILABLE]);
        let client = http_client(false).unwrap();

        let err = check_http_health(
            "07-kubernetes-services",
            &client,
            &url,
            &RetryPolicy::fixed(2, Duration::ZERO),
        )
        .unwrap_err();

        assert!(matches!(err, DeployError::Validation { .. }));
    }
}
