use std::net::{IpAddr, ToSocketAddrs};

/// Turns an advertised host name into an address.
///
/// Neighbour listings are only as good as the addresses in them; entries whose
/// host does not resolve are dropped rather than handed to callers.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, host: &str) -> Option<IpAddr>;
}

/// Resolver backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl HostResolver for SystemResolver {
    fn resolve(&self, host: &str) -> Option<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(ip);
        }
        (host, 0)
            .to_socket_addrs()
            .ok()?
            .map(|addr| addr.ip())
            .find(IpAddr::is_ipv4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_addresses_resolve() {
        assert_eq!(
            SystemResolver.resolve("127.0.0.1"),
            Some(IpAddr::from([127, 0, 0, 1]))
        );
    }

    #[test]
    fn garbage_does_not_resolve() {
        assert_eq!(SystemResolver.resolve("not a host name!"), None);
    }
}
