use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
#[non_exhaustive]
pub enum InvalidRangeError {
    #[error("malformed address range `{input}`: {source}")]
    Malformed {
        input: String,
        source: ipnet::AddrParseError,
    },
    #[error("address range `{0}` contains no usable host addresses")]
    NoUsableHosts(String),
}

/// A contiguous block of IPv4 addresses in prefix notation, e.g. `10.0.0.0/24`.
///
/// Host bits in the parsed input are ignored (`192.168.1.5/24` denotes the
/// same range as `192.168.1.0/24`). Immutable once parsed.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct AddressRange {
    net: Ipv4Net,
}

impl AddressRange {
    pub fn new(net: Ipv4Net) -> Self {
        Self { net: net.trunc() }
    }

    /// Iterates over the usable host addresses in ascending order.
    ///
    /// The network and broadcast addresses are excluded for prefixes up to
    /// /30; a /31 yields both addresses and a /32 yields the single address,
    /// since those blocks have no network/broadcast distinction.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> {
        self.net.hosts()
    }

    /// Number of usable host addresses, without materializing them.
    pub fn host_count(&self) -> u64 {
        match self.net.prefix_len() {
            32 => 1,
            31 => 2,
            prefix => (1u64 << (32 - prefix)) - 2,
        }
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }
}

impl FromStr for AddressRange {
    type Err = InvalidRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let net: Ipv4Net = s.trim().parse().map_err(|source| InvalidRangeError::Malformed {
            input: s.to_string(),
            source,
        })?;
        Ok(Self::new(net))
    }
}

impl fmt::Display for AddressRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.net)
    }
}
