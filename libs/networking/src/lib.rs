//! Networking utilities for agents.
//!
//! Each agent owns a fixed, ordered pool of addresses it may bind gameserver
//! ports on. Two instances publishing the same protocol and port must sit on
//! different addresses, so allocation scans the pool in configured order and
//! returns the first address the caller reports as free (first-fit).

use std::future::Future;
use std::net::IpAddr;
use std::str::FromStr;

use thiserror::Error;

/// Networking errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NetworkError {
    /// Invalid IP address.
    #[error("invalid IP address: {0}")]
    InvalidAddress(String),

    /// The same address appears twice in the pool.
    #[error("duplicate address in pool: {0}")]
    DuplicateAddress(IpAddr),

    /// The pool has no addresses at all.
    #[error("address pool is empty")]
    EmptyPool,

    /// Every address in the pool already serves the requested port.
    #[error("no free address for {port} among {pool_size} addresses")]
    NoFreeAddress { port: String, pool_size: usize },
}

// ============================================================================
// Address pool
// ============================================================================

/// Ordered set of addresses an agent may bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPool {
    addresses: Vec<IpAddr>,
}

impl AddressPool {
    /// Create a pool, keeping the given order.
    pub fn new(addresses: Vec<IpAddr>) -> Result<Self, NetworkError> {
        if addresses.is_empty() {
            return Err(NetworkError::EmptyPool);
        }

        for (i, addr) in addresses.iter().enumerate() {
            if addresses[..i].contains(addr) {
                return Err(NetworkError::DuplicateAddress(*addr));
            }
        }

        Ok(Self { addresses })
    }

    /// Parse a comma separated list (e.g., "10.0.0.1, 10.0.0.2").
    pub fn from_list(s: &str) -> Result<Self, NetworkError> {
        let addresses = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                IpAddr::from_str(part).map_err(|_| NetworkError::InvalidAddress(part.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Self::new(addresses)
    }

    pub fn len(&self) -> usize {
        self.addresses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addresses.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpAddr> {
        self.addresses.iter()
    }

    /// The first configured address, used when no port needs a conflict check.
    pub fn primary(&self) -> IpAddr {
        self.addresses[0]
    }

    /// First address for which `in_use` reports false, in pool order.
    ///
    /// `port` only labels the error. Probe errors abort the scan.
    pub async fn allocate<F, Fut, E>(&self, port: &str, mut in_use: F) -> Result<IpAddr, E>
    where
        F: FnMut(IpAddr) -> Fut,
        Fut: Future<Output = Result<bool, E>>,
        E: From<NetworkError>,
    {
        for addr in &self.addresses {
            if !in_use(*addr).await? {
                return Ok(*addr);
            }
        }

        Err(self.exhausted(port).into())
    }

    fn exhausted(&self, port: &str) -> NetworkError {
        NetworkError::NoFreeAddress {
            port: port.to_string(),
            pool_size: self.addresses.len(),
        }
    }
}

impl FromStr for AddressPool {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_list(s)
    }
}
