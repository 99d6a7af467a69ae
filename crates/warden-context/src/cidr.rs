//! CIDR blocks for address-range contexts.
//!
//! No external CIDR crate is used; containment is explicit prefix
//! masking over [`std::net::IpAddr`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An IP network in CIDR notation, or a single address.
///
/// Parses `"10.0.0.0/8"`, `"2001:db8::/32"`, and bare addresses (which
/// get the full-length prefix: /32 for IPv4, /128 for IPv6).
///
/// # Example
///
/// ```
/// use warden_context::CidrBlock;
///
/// let net: CidrBlock = "10.0.0.0/8".parse().unwrap();
/// assert!(net.contains("10.1.2.3".parse().unwrap()));
/// assert!(!net.contains("11.0.0.1".parse().unwrap()));
///
/// let host: CidrBlock = "192.168.1.1".parse().unwrap();
/// assert_eq!(host.prefix(), 32);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CidrBlock {
    addr: IpAddr,
    prefix: u8,
}

/// Error from parsing a CIDR block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrParseError(String);

impl fmt::Display for CidrParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid CIDR block: {}", self.0)
    }
}

impl std::error::Error for CidrParseError {}

impl CidrBlock {
    /// Creates a block from an address and prefix length.
    ///
    /// The prefix is clamped to the address family's maximum (32 or 128).
    #[must_use]
    pub fn new(addr: IpAddr, prefix: u8) -> Self {
        let max = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        Self {
            addr,
            prefix: prefix.min(max),
        }
    }

    /// Creates a single-host block (full-length prefix).
    #[must_use]
    pub fn host(addr: IpAddr) -> Self {
        match addr {
            IpAddr::V4(_) => Self { addr, prefix: 32 },
            IpAddr::V6(_) => Self { addr, prefix: 128 },
        }
    }

    /// The network address as written.
    #[must_use]
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// The prefix length.
    #[must_use]
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Returns `true` if `candidate` lies inside this block.
    ///
    /// Mixed address families never match.
    #[must_use]
    pub fn contains(&self, candidate: IpAddr) -> bool {
        match (self.addr, candidate) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_v4(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_v6(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn mask_v4(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix.min(32)))
    }
}

fn mask_v6(prefix: u8) -> u128 {
    if prefix == 0 {
        0
    } else {
        u128::MAX << (128 - u32::from(prefix.min(128)))
    }
}

impl FromStr for CidrBlock {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            Some((addr, prefix)) => {
                let addr: IpAddr = addr
                    .parse()
                    .map_err(|_| CidrParseError(s.to_string()))?;
                let prefix: u8 = prefix
                    .parse()
                    .map_err(|_| CidrParseError(s.to_string()))?;
                let max = match addr {
                    IpAddr::V4(_) => 32,
                    IpAddr::V6(_) => 128,
                };
                if prefix > max {
                    return Err(CidrParseError(s.to_string()));
                }
                Ok(Self { addr, prefix })
            }
            None => {
                let addr: IpAddr = s.parse().map_err(|_| CidrParseError(s.to_string()))?;
                Ok(Self::host(addr))
            }
        }
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}
