//! URL validation for SSRF protection.
//!
//! Every URL the pipeline fetches is user-supplied or scraped, so each one is
//! parsed, resolved and checked here first. The address that passed the check
//! travels with the URL as a [`SafeTarget`] and the fetch connects to exactly
//! that address, so a second DNS answer can't swap in an internal host.

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use ipnet::IpNet;
use tracing::warn;
use url::{Host, Url};

use crate::error::{SecurityError, SecurityResult};

static DEFAULT_BLOCKED_CIDRS: LazyLock<Vec<IpNet>> = LazyLock::new(|| {
    [
        "127.0.0.0/8",    // Loopback
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "169.254.0.0/16", // Link-local / cloud metadata
        "0.0.0.0/8",
        "::/128",         // IPv6 unspecified, connects locally
        "::1/128",        // IPv6 loopback
        "64:ff9b::/96",   // NAT64, translates to arbitrary IPv4
        "fc00::/7",       // IPv6 private
        "fe80::/10",      // IPv6 link-local
    ]
    .iter()
    .map(|cidr| cidr.parse().expect("valid CIDR"))
    .collect()
});

/// DNS lookup used by the validator, independent of the HTTP client.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn lookup(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>>;
}

/// Resolver backed by the operating system (`getaddrinfo`).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str, port: u16) -> std::io::Result<Vec<SocketAddr>> {
        Ok(tokio::net::lookup_host((host, port)).await?.collect())
    }
}

/// A URL that passed validation, pinned to the address it was checked against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafeTarget {
    url: Url,
    addr: SocketAddr,
}

impl SafeTarget {
    #[cfg(test)]
    pub(crate) fn pinned(url: &str, addr: SocketAddr) -> Self {
        Self {
            url: Url::parse(url).expect("test URL"),
            addr,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    /// Host as written in the URL; the name the pinned address is bound to.
    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}

/// URL validator for SSRF protection.
///
/// Rejects without touching the network:
/// - Non-HTTP(S) schemes (file://, ftp://)
/// - URLs with no host
/// - IP literals in private, loopback or link-local ranges
///
/// Hostnames are then resolved and rejected if any address they resolve to
/// falls in a blocked range, or if resolution fails.
#[derive(Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    blocked_cidrs: Vec<IpNet>,
    resolver: Arc<dyn Resolver>,
}

impl fmt::Debug for UrlValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlValidator")
            .field("allowed_schemes", &self.allowed_schemes)
            .field("blocked_cidrs", &self.blocked_cidrs)
            .finish_non_exhaustive()
    }
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    /// Create a validator with default rules and the system resolver.
    pub fn new() -> Self {
        Self::with_resolver(Arc::new(SystemResolver))
    }

    pub fn with_resolver(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_cidrs: DEFAULT_BLOCKED_CIDRS.clone(),
            resolver,
        }
    }

    /// Block an additional CIDR range.
    pub fn block_cidr(mut self, cidr: IpNet) -> Self {
        self.blocked_cidrs.push(cidr);
        self
    }

    /// Whether an address falls in a blocked range. IPv6 addresses that
    /// embed an IPv4 address (mapped `::ffff:a.b.c.d` or compatible
    /// `::a.b.c.d`) are also judged by their IPv4 form.
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        let embedded = match ip {
            IpAddr::V6(v6) => v6.to_ipv4().map(IpAddr::V4),
            IpAddr::V4(_) => None,
        };
        std::iter::once(ip)
            .chain(embedded)
            .any(|ip| self.blocked_cidrs.iter().any(|cidr| cidr.contains(&ip)))
    }

    /// Static checks only: scheme, host presence, and IP-literal hosts.
    pub fn validate(&self, url: &str) -> SecurityResult<Url> {
        let parsed = Url::parse(url)?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        match parsed.host() {
            None => return Err(SecurityError::NoHost),
            Some(Host::Domain(domain)) if domain.is_empty() => return Err(SecurityError::NoHost),
            Some(Host::Domain(_)) => {}
            Some(Host::Ipv4(ip)) => self.check_ip(IpAddr::V4(ip))?,
            Some(Host::Ipv6(ip)) => self.check_ip(IpAddr::V6(ip))?,
        }

        Ok(parsed)
    }

    /// Validate a URL and resolve its host, returning the pinned target.
    ///
    /// Fails closed: a failed lookup, an empty answer, or any blocked address
    /// in the answer rejects the URL.
    pub async fn resolve(&self, url: &str) -> SecurityResult<SafeTarget> {
        let parsed = self.validate(url)?;
        let port = parsed.port_or_known_default().unwrap_or(80);

        let addr = match parsed.host() {
            Some(Host::Ipv4(ip)) => SocketAddr::new(IpAddr::V4(ip), port),
            Some(Host::Ipv6(ip)) => SocketAddr::new(IpAddr::V6(ip), port),
            Some(Host::Domain(domain)) => {
                let addrs = self
                    .resolver
                    .lookup(domain, port)
                    .await
                    .map_err(|e| SecurityError::DnsResolution(e.to_string()))?;

                if let Some(bad) = addrs.iter().find(|a| self.is_blocked(a.ip())) {
                    return Err(SecurityError::BlockedCidr(format!(
                        "DNS for {} resolved to blocked IP {}",
                        domain,
                        bad.ip()
                    )));
                }

                addrs.into_iter().next().ok_or_else(|| {
                    SecurityError::DnsResolution(format!("no addresses for {domain}"))
                })?
            }
            None => return Err(SecurityError::NoHost),
        };

        Ok(SafeTarget { url: parsed, addr })
    }

    /// Like [`resolve`](Self::resolve), logging and discarding the reason.
    pub async fn check(&self, url: &str) -> Option<SafeTarget> {
        match self.resolve(url).await {
            Ok(target) => Some(target),
            Err(e) => {
                warn!(url, error = %e, "Blocked unsafe URL");
                None
            }
        }
    }

    pub async fn is_safe(&self, url: &str) -> bool {
        self.check(url).await.is_some()
    }

    fn check_ip(&self, ip: IpAddr) -> SecurityResult<()> {
        if self.is_blocked(ip) {
            return Err(SecurityError::BlockedCidr(ip.to_string()));
        }
        Ok(())
    }
}
