//! Nameserver configuration: the shape the resolver consumes from an
//! external `/etc/resolv.conf` reader. Parsing the textual file itself
//! stays outside this crate's scope; only the parsed-data contract lives
//! here.
use std::net::SocketAddr;
use std::time::Duration;

use crate::name::Name;

/// Where a lookup is attempted: a local hosts table, or the configured
/// nameservers. Order matters — `ResolverConfig::lookup` is consulted
/// left-to-right.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    File,
    Bind,
}

/// Per-query tuning.
#[derive(Debug, Clone)]
pub struct Options {
    /// Minimum dot count for a name to be tried as-is before search-list
    /// expansion.
    pub ndots: u32,
    pub timeout: Duration,
    pub attempts: u32,
    /// Consulted only to decide whether to request a larger UDP payload
    /// size convention — no OPT RR is constructed or parsed.
    pub edns0: bool,
    pub rotate: bool,
    pub recurse: bool,
    pub smart: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            ndots: 1,
            timeout: Duration::from_secs(5),
            attempts: 2,
            edns0: false,
            rotate: false,
            recurse: true,
            smart: true,
        }
    }
}

/// The shape of resolver configuration the library consumes.
/// `ResolverConfig::default()` mirrors the classic resolver's compiled-in
/// defaults; `from_parts` is the seam an external `/etc/resolv.conf` reader
/// plugs into.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub nameservers: Vec<SocketAddr>,
    pub search: Vec<Name>,
    pub lookup: Vec<LookupSource>,
    pub options: Options,
    pub interface: Option<SocketAddr>,
}

/// `resolv.conf` caps the nameserver list at 3 historically (`MAXNS`); this
/// crate is more permissive but still bounds it to guard against a
/// pathological config blowing up nameserver iteration.
pub const MAXNS: usize = 16;

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            nameservers: Vec::new(),
            search: Vec::new(),
            lookup: vec![LookupSource::File, LookupSource::Bind],
            options: Options::default(),
            interface: None,
        }
    }
}

impl ResolverConfig {
    pub fn from_parts(
        nameservers: Vec<SocketAddr>,
        search: Vec<Name>,
        lookup: Vec<LookupSource>,
        options: Options,
        interface: Option<SocketAddr>,
    ) -> Self {
        let mut nameservers = nameservers;
        nameservers.truncate(MAXNS);
        ResolverConfig { nameservers, search, lookup, options, interface }
    }

    /// Stub mode: talk directly to `nameservers`, RD=1, no delegation
    /// following. Recursive mode (no configured nameservers, or
    /// `options.recurse` left at its historical meaning of "I will do the
    /// recursion myself") starts instead from root hints.
    pub fn is_stub(&self) -> bool {
        !self.nameservers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ResolverConfig::default();
        assert_eq!(cfg.options.ndots, 1);
        assert_eq!(cfg.options.timeout, Duration::from_secs(5));
        assert_eq!(cfg.options.attempts, 2);
        assert!(cfg.options.recurse);
        assert!(cfg.options.smart);
        assert_eq!(cfg.lookup, vec![LookupSource::File, LookupSource::Bind]);
    }

    #[test]
    fn from_parts_truncates_nameserver_list_to_maxns() {
        let ns: Vec<SocketAddr> = (0..32)
            .map(|i| SocketAddr::from(([127, 0, 0, 1], 5300 + i as u16)))
            .collect();
        let cfg = ResolverConfig::from_parts(ns, Vec::new(), Vec::new(), Options::default(), None);
        assert_eq!(cfg.nameservers.len(), MAXNS);
    }
}
