//! TCP reachability and DNS propagation checks.

use std::collections::BTreeSet;
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::info;

use crate::error::DeployResult;
use crate::retry::{Attempt, RetryPolicy, retry};

/// Ports the ingress must expose: http, https, ssh, sftp, dask scheduler,
/// and the internal proxy.
pub const INGRESS_PORTS: [u16; 6] = [80, 443, 8022, 8023, 8786, 9080];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn resolve(host: &str) -> std::io::Result<BTreeSet<IpAddr>> {
    Ok((host, 0)
        .to_socket_addrs()?
        .map(|addr| addr.ip())
        .collect())
}

fn tcp_attempt(host: &str, port: u16) -> Attempt<SocketAddr> {
    let addrs = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect::<Vec<_>>(),
        Err(e) => return Attempt::Retry(format!("failed to resolve {host}: {e}")),
    };
    let mut last = format!("no addresses for {host}");
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(_) => return Attempt::Success(addr),
            Err(e) => last = format!("failed to connect to tcp://{addr}: {e}"),
        }
    }
    Attempt::Retry(last)
}

/// Every port in `ports` accepts a TCP connection on `host`.
pub fn check_tcp_ports(
    stage: &str,
    host: &str,
    ports: &[u16],
    policy: &RetryPolicy,
) -> DeployResult<()> {
    for port in ports {
        let addr = retry(policy, |_| tcp_attempt(host, *port))
            .into_validation(stage, &format!("tcp://{host}:{port}"))?;
        info!(stage, "connected to tcp://{addr}");
    }
    Ok(())
}

/// `domain` resolves to at least one address of `expected_host`.
pub fn check_dns(
    stage: &str,
    domain: &str,
    expected_host: &str,
    policy: &RetryPolicy,
) -> DeployResult<()> {
    let outcome = retry(policy, |_| {
        let expected = match resolve(expected_host) {
            Ok(ips) => ips,
            Err(e) => return Attempt::Retry(format!("failed to resolve {expected_host}: {e}")),
        };
        match resolve(domain) {
            Ok(found) if !found.is_disjoint(&expected) => Attempt::Success(found),
            Ok(found) => Attempt::Retry(format!(
                "{domain} resolves to {found:?}, expected one of {expected:?}"
            )),
            Err(e) => Attempt::Retry(format!("record for {domain} does not exist yet: {e}")),
        }
    });
    let found = outcome.into_validation(stage, &format!("dns://{domain}"))?;
    info!(stage, domain, ips = ?found, "DNS matches ingress address");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeployError;
    use std::net::TcpListener;

    fn immediate(attempts: u32) -> RetryPolicy {
        RetryPolicy::fixed(attempts, Duration::ZERO)
    }

    #[test]
    fn open_port_passes() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        check_tcp_ports("04-kubernetes-ingress", "127.0.0.1", &[port], &immediate(1)).unwrap();
    }

    #[test]
    fn closed_port_is_validation_error_naming_resource() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = check_tcp_ports("04-kubernetes-ingress", "127.0.0.1", &[port], &immediate(2))
            .unwrap_err();

        match err {
            DeployError::Validation { stage, resource, .. } => {
                assert_eq!(stage, "04-kubernetes-ingress");
                assert_eq!(resource, format!("tcp://127.0.0.1:{port}"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn localhost_matches_loopback() {
        check_dns("04-kubernetes-ingress", "localhost", "127.0.0.1", &immediate(1)).unwrap();
    }
}
