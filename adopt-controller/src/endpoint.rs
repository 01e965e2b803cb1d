//! `host:port` handling for node endpoints.

/// Port of the node API when the endpoint does not carry one.
pub const DEFAULT_NODE_PORT: u16 = 50000;

/// Split a `host:port` or bare `host` endpoint.
///
/// Everything before the first `:` is the host. The remainder must parse as a
/// port in `1..=65535`, otherwise [`DEFAULT_NODE_PORT`] applies. Bracketed
/// IPv6 literals are not understood.
pub fn split_endpoint(endpoint: &str) -> (&str, u16) {
    match endpoint.split_once(':') {
        Some((host, port)) => (host, parse_port(port).unwrap_or(DEFAULT_NODE_PORT)),
        None => (endpoint, DEFAULT_NODE_PORT),
    }
}

fn parse_port(s: &str) -> Option<u16> {
    match s.trim().parse::<u32>() {
        Ok(port) if port > 0 && port <= u32::from(u16::MAX) => u16::try_from(port).ok(),
        _ => None,
    }
}
