//! IPv4 address-range math.
//!
//! Converts a network address and prefix length into the ordered usable host
//! addresses (network and broadcast excluded), tests membership, and parses
//! the two descriptor forms accepted as sweep input:
//! - CIDR, `192.168.1.0/24` (prefix 24–30)
//! - last-octet span, `192.168.30.1-254`
//!
//! All arithmetic is on `u32`, so shifts are logical and the
//! `255.255.255.255` boundary needs no special casing.

use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::RangeError;

/// Largest usable-host count that is materialized as a list (a /22).
pub const MAX_LISTED_HOSTS: u64 = 1022;

/// Narrowest and widest CIDR prefixes accepted as sweep input.
pub const MIN_SWEEP_PREFIX: u8 = 24;
pub const MAX_SWEEP_PREFIX: u8 = 30;

/// A range of IPv4 host addresses.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AddressRange {
    /// A subnet; usable hosts exclude the network and broadcast addresses.
    Cidr {
        network_address: Ipv4Addr,
        prefix_length: u8,
    },
    /// An inclusive span of addresses sharing the first three octets.
    Span { start: Ipv4Addr, end: Ipv4Addr },
}

impl AddressRange {
    /// Build a CIDR range, zeroing any host bits in `network_address`.
    pub fn cidr(network_address: Ipv4Addr, prefix_length: u8) -> Result<Self, RangeError> {
        if prefix_length > 32 {
            return Err(RangeError::InvalidRange(format!(
                "prefix length {prefix_length} is outside 0..=32"
            )));
        }
        let network = u32::from(network_address) & mask(prefix_length);
        Ok(Self::Cidr {
            network_address: Ipv4Addr::from(network),
            prefix_length,
        })
    }

    /// The usable host addresses in this range.
    pub fn usable(&self) -> UsableAddresses {
        match *self {
            Self::Cidr {
                network_address,
                prefix_length,
            } => cidr_usable(network_address, prefix_length),
            Self::Span { start, end } => {
                let (lo, hi) = (u32::from(start), u32::from(end));
                if lo > hi {
                    return UsableAddresses::Listed(Vec::new());
                }
                UsableAddresses::Listed((lo..=hi).map(Ipv4Addr::from).collect())
            }
        }
    }

    /// The covering prefix: the CIDR itself, or the /24 holding a span.
    pub fn covering_network(&self) -> (Ipv4Addr, u8) {
        match *self {
            Self::Cidr {
                network_address,
                prefix_length,
            } => (network_address, prefix_length),
            Self::Span { start, .. } => (Ipv4Addr::from(u32::from(start) & mask(24)), 24),
        }
    }

    /// Whether `address` is one of this range's usable hosts.
    pub fn includes(&self, address: Ipv4Addr) -> bool {
        match *self {
            Self::Cidr {
                network_address,
                prefix_length,
            } => {
                let m = mask(prefix_length);
                let network = u32::from(network_address) & m;
                let addr = u32::from(address);
                prefix_length <= 30
                    && contains(address, network_address, prefix_length)
                    && addr != network
                    && addr != network | !m
            }
            Self::Span { start, end } => start <= address && address <= end,
        }
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cidr {
                network_address,
                prefix_length,
            } => write!(f, "{network_address}/{prefix_length}"),
            Self::Span { start, end } => write!(f, "{start}-{}", end.octets()[3]),
        }
    }
}

/// Usable addresses of a range.
///
/// Ranges larger than [`MAX_LISTED_HOSTS`] are reported only by their
/// boundaries and count; callers must not assume a list is available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsableAddresses {
    Listed(Vec<Ipv4Addr>),
    Summary {
        first: Ipv4Addr,
        last: Ipv4Addr,
        count: u64,
    },
}

impl UsableAddresses {
    pub fn count(&self) -> u64 {
        match self {
            Self::Listed(addrs) => addrs.len() as u64,
            Self::Summary { count, .. } => *count,
        }
    }

    pub fn first(&self) -> Option<Ipv4Addr> {
        match self {
            Self::Listed(addrs) => addrs.first().copied(),
            Self::Summary { first, .. } => Some(*first),
        }
    }

    pub fn last(&self) -> Option<Ipv4Addr> {
        match self {
            Self::Listed(addrs) => addrs.last().copied(),
            Self::Summary { last, .. } => Some(*last),
        }
    }

    /// The materialized list, when the range was small enough to expand.
    pub fn as_slice(&self) -> Option<&[Ipv4Addr]> {
        match self {
            Self::Listed(addrs) => Some(addrs),
            Self::Summary { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }
}

/// Usable host addresses of `network_address/prefix_length`.
///
/// Fails with `InvalidRange` on a malformed address or a prefix above 32.
pub fn usable_addresses(
    network_address: &str,
    prefix_length: u8,
) -> Result<UsableAddresses, RangeError> {
    let addr = parse_ipv4(network_address)
        .ok_or_else(|| RangeError::InvalidRange(format!("malformed address {network_address:?}")))?;
    Ok(AddressRange::cidr(addr, prefix_length)?.usable())
}

/// Whether `address` lies inside `network_address/prefix_length`.
///
/// Prefixes above 32 never match.
pub fn contains(address: Ipv4Addr, network_address: Ipv4Addr, prefix_length: u8) -> bool {
    if prefix_length > 32 {
        return false;
    }
    let m = mask(prefix_length);
    u32::from(address) & m == u32::from(network_address) & m
}

/// Parse a sweep descriptor: `a.b.c.d/n` (n in 24..=30) or `a.b.c.start-end`
/// (1 <= start < end <= 254).
pub fn parse_descriptor(text: &str) -> Result<AddressRange, RangeError> {
    let text = text.trim();
    let invalid = |why: &str| RangeError::InvalidDescriptor(format!("{text:?}: {why}"));

    if text.contains('/') {
        let net: Ipv4Net = text.parse().map_err(|_| invalid("not a CIDR block"))?;
        if parse_ipv4(&text[..text.find('/').unwrap_or(0)]).is_none() {
            return Err(invalid("malformed address"));
        }
        if !(MIN_SWEEP_PREFIX..=MAX_SWEEP_PREFIX).contains(&net.prefix_len()) {
            return Err(invalid("prefix must be between /24 and /30"));
        }
        return Ok(AddressRange::Cidr {
            network_address: net.network(),
            prefix_length: net.prefix_len(),
        });
    }

    let (start_text, end_text) = text
        .split_once('-')
        .ok_or_else(|| invalid("expected CIDR or last-octet range"))?;
    let start = parse_ipv4(start_text.trim()).ok_or_else(|| invalid("malformed start address"))?;
    let end_octet: u8 = end_text
        .trim()
        .parse()
        .map_err(|_| invalid("malformed end octet"))?;
    let start_octet = start.octets()[3];

    if end_octet > 254 {
        return Err(invalid("end octet must be at most 254"));
    }
    if start_octet == 0 || start_octet >= end_octet {
        return Err(invalid("start octet must be at least 1 and below the end"));
    }

    let [a, b, c, _] = start.octets();
    Ok(AddressRange::Span {
        start,
        end: Ipv4Addr::new(a, b, c, end_octet),
    })
}

/// Strict dotted-quad parse: four decimal octets, each 0–255.
pub fn parse_ipv4(text: &str) -> Option<Ipv4Addr> {
    let mut octets = [0u8; 4];
    let mut parts = text.split('.');
    for octet in &mut octets {
        let part = parts.next()?;
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u16 = part.parse().ok()?;
        *octet = u8::try_from(value).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(Ipv4Addr::from(octets))
}

fn mask(prefix_length: u8) -> u32 {
    u32::MAX
        .checked_shl(32 - u32::from(prefix_length.min(32)))
        .unwrap_or(0)
}

fn cidr_usable(network_address: Ipv4Addr, prefix_length: u8) -> UsableAddresses {
    let host_bits = 32 - u32::from(prefix_length);
    let count = (1u64 << host_bits).saturating_sub(2);
    if count == 0 {
        return UsableAddresses::Listed(Vec::new());
    }

    let network = u32::from(network_address) & mask(prefix_length);
    let broadcast = network | !mask(prefix_length);
    let (first, last) = (network + 1, broadcast - 1);

    if count > MAX_LISTED_HOSTS {
        return UsableAddresses::Summary {
            first: Ipv4Addr::from(first),
            last: Ipv4Addr::from(last),
            count,
        };
    }
    UsableAddresses::Listed((first..=last).map(Ipv4Addr::from).collect())
}
