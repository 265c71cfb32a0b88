//! Trait boundaries to the three external collaborators: the flooding
//! transport, the interface-management layer, and stable storage. The
//! kernel only ever calls through these; it never reaches into sockets,
//! netlink, or a database itself.

use crate::prefix::Prefix;

/// Outputs destined for the flooding layer (disseminated to peers).
pub trait FloodingSink {
    /// A lap was created, changed ownership/flooded state, or is gone.
    fn updated_lap(&mut self, prefix: Prefix, ifname: &str, to_delete: bool);

    /// A locally-delegated dp changed or is gone (`valid_until == 0`).
    fn updated_ldp(
        &mut self,
        prefix: Prefix,
        excluded: Option<Prefix>,
        ifname: Option<&str>,
        valid_until: i64,
        preferred_until: i64,
        dhcp: Option<&[u8]>,
    );
}

/// Outputs destined for the interface-management layer (applied to links).
pub trait InterfaceSink {
    /// A lap's `assigned` transition fired: apply or withdraw it on the link.
    fn update_prefix(
        &mut self,
        prefix: Prefix,
        ifname: &str,
        valid_until: i64,
        preferred_until: i64,
        dhcp: Option<&[u8]>,
        withdraw: bool,
    );

    /// An interface's DHCP-server role changed.
    fn update_link_owner(&mut self, ifname: &str, do_dhcp: bool);
}

/// Stable storage for the one chosen ULA prefix and per-interface
/// preferred prefixes, consulted before falling back to random search.
pub trait Storage {
    fn ula_get(&mut self) -> Option<Prefix>;
    fn ula_set(&mut self, prefix: Prefix);

    /// Any previously stored prefix for `ifname` that still fits in `dp`
    /// and satisfies `collides`.
    fn find_stored_prefix(
        &mut self,
        ifname: &str,
        dp: &Prefix,
        collides: &mut dyn FnMut(&Prefix) -> bool,
    ) -> Option<Prefix>;

    fn store_prefix(&mut self, ifname: &str, prefix: Prefix);
}

/// A `Storage` that remembers nothing; used by tests and by callers with
/// no persistence layer wired up (every pass falls through to random
/// search).
#[derive(Debug, Default)]
pub struct NullStorage {
    ula: Option<Prefix>,
}

impl Storage for NullStorage {
    fn ula_get(&mut self) -> Option<Prefix> {
        self.ula
    }

    fn ula_set(&mut self, prefix: Prefix) {
        self.ula = Some(prefix);
    }

    fn find_stored_prefix(
        &mut self,
        _ifname: &str,
        _dp: &Prefix,
        _collides: &mut dyn FnMut(&Prefix) -> bool,
    ) -> Option<Prefix> {
        None
    }

    fn store_prefix(&mut self, _ifname: &str, _prefix: Prefix) {}
}
