//! Destination check: resolve the target domain and refuse private networks.
//!
//! # Responsibilities
//! - Resolve the domain through a pluggable [`Resolver`]
//! - Classify the first resolved address against the blocked ranges
//! - Report resolution failure as its own outcome
//!
//! # Blocked Ranges
//! `10.0.0.0/8`, `172.16.0.0/12`, `192.168.0.0/16`, `127.0.0.0/8`, `::1/128`.
//! IPv4-mapped IPv6 addresses are checked as their IPv4 form.

use std::io;
use std::net::{IpAddr, Ipv4Addr};

use futures_util::future::BoxFuture;

/// Hostname resolution used by the destination check.
pub trait Resolver: Send + Sync {
    fn resolve<'a>(&'a self, host: &'a str) -> BoxFuture<'a, io::Result<Vec<IpAddr>>>;
}

/// Platform resolver backed by `tokio::net::lookup_host`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve<'a>(&'a self, host: &'a str) -> BoxFuture<'a, io::Result<Vec<IpAddr>>> {
        Box::pin(async move {
            let addrs = tokio::net::lookup_host((host, 0)).await?;
            Ok(addrs.map(|addr| addr.ip()).collect())
        })
    }
}

/// Outcome of the destination check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationCheck {
    /// Resolved to a public address.
    Safe(IpAddr),
    /// Resolved into a blocked range.
    PrivateBlocked(IpAddr),
    /// The resolver returned an error.
    ResolutionFailed(String),
    /// Resolution succeeded but produced nothing to classify.
    Inconclusive,
}

fn is_private_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    a == 10 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168) || a == 127
}

/// True if `ip` falls in one of the blocked ranges.
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => is_private_v4(v4),
            None => v6.is_loopback(),
        },
    }
}

/// Resolve `domain` and classify the first address returned.
pub async fn check_destination(resolver: &dyn Resolver, domain: &str) -> DestinationCheck {
    match resolver.resolve(domain).await {
        Ok(addrs) => match addrs.first() {
            Some(&ip) if is_private_ip(ip) => DestinationCheck::PrivateBlocked(ip),
            Some(&ip) => DestinationCheck::Safe(ip),
            None => DestinationCheck::Inconclusive,
        },
        Err(e) => DestinationCheck::ResolutionFailed(e.to_string()),
    }
}
