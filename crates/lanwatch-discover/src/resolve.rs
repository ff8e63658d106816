//! Reverse name lookup for discovered addresses.

use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

/// Looks up a display name for an address. Swapped out in tests.
#[async_trait]
pub trait NameResolver: Send + Sync {
    /// The PTR name for `ip`, if any. Callers bound this with a timeout.
    async fn reverse(&self, ip: Ipv4Addr) -> Option<String>;
}

/// DNS PTR lookups through hickory.
#[derive(Clone)]
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// Use the system resolver configuration, falling back to hickory's defaults.
    pub fn from_system() -> Self {
        let resolver = match TokioAsyncResolver::tokio_from_system_conf() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(error = %e, "System resolver config unavailable, using defaults");
                TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default())
            }
        };
        Self { resolver }
    }
}

#[async_trait]
impl NameResolver for DnsResolver {
    async fn reverse(&self, ip: Ipv4Addr) -> Option<String> {
        match self.resolver.reverse_lookup(IpAddr::V4(ip)).await {
            Ok(lookup) => lookup.iter().next().map(|ptr| ptr.to_string()),
            Err(e) => {
                tracing::trace!(ip = %ip, error = %e, "Reverse lookup failed");
                None
            }
        }
    }
}

/// Reduce a host name to its leading label: `nas.lan.` becomes `nas`.
pub fn short_name(name: &str) -> Option<String> {
    let label = name.trim().trim_end_matches('.').split('.').next()?;
    if label.is_empty() {
        None
    } else {
        Some(label.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_strips_domain_and_trailing_dot() {
        assert_eq!(short_name("nas.lan."), Some("nas".to_string()));
        assert_eq!(short_name("printer.office.example.com"), Some("printer".to_string()));
        assert_eq!(short_name("router"), Some("router".to_string()));
        assert_eq!(short_name("router."), Some("router".to_string()));
    }

    #[test]
    fn short_name_rejects_empty() {
        assert_eq!(short_name(""), None);
        assert_eq!(short_name("."), None);
        assert_eq!(short_name("   "), None);
    }
}
