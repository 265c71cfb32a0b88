//! Entity store: interfaces, delegated prefixes, external assignments, and
//! local assignments, arena-keyed by stable ids rather than the intrusive
//! linked lists the original algorithm used. Every cross-reference between
//! entities is a non-owning id; destruction always clears the reverse
//! indices before the entity itself is dropped.

use std::collections::{HashMap, HashSet};

use crate::error::{PaError, PaResult};
use crate::prefix::Prefix;
use crate::timer::Delayed;

const IFNAMSIZ: usize = 16;

/// A 16-byte router id, ordered by unsigned lexicographic compare (derived
/// array `Ord` does exactly this for `[u8; N]`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rid(pub [u8; 16]);

impl Rid {
    pub const ZERO: Rid = Rid([0u8; 16]);
}

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);
    };
}

entity_id!(IfaceId);
entity_id!(DpId);
entity_id!(EapId);
entity_id!(LapId);

#[derive(Debug, Clone, Default)]
pub struct Iface {
    pub name: String,
    pub internal: bool,
    pub do_dhcp: bool,
    pub designated: bool,
    pub laps: HashSet<LapId>,
    pub eaps: HashSet<EapId>,
    pub dps: HashSet<DpId>,
}

impl Iface {
    /// An interface with no forced internal membership and nothing
    /// delegated through it is retired.
    pub fn is_orphaned(&self) -> bool {
        !self.internal && self.eaps.is_empty() && self.dps.is_empty()
    }
}

/// Which local-prefix generator instance created a local DP, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalGenKind {
    Ula,
    Ipv4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DpOwner {
    Local { generator: Option<LocalGenKind> },
    Peer(Rid),
}

impl DpOwner {
    pub fn is_local(&self) -> bool {
        matches!(self, DpOwner::Local { .. })
    }

    pub fn rid(&self) -> Option<Rid> {
        match self {
            DpOwner::Peer(rid) => Some(*rid),
            DpOwner::Local { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dp {
    pub prefix: Prefix,
    pub owner: DpOwner,
    pub valid_until: i64,
    pub preferred_until: i64,
    pub excluded: Option<Prefix>,
    pub dhcp: Option<Vec<u8>>,
    /// Only set for a local DP delegated in via a specific interface
    /// (upstream DHCP-PD or IPv4 uplink); generator-created DPs (ULA) have
    /// none.
    pub iface: Option<IfaceId>,
    pub laps: HashSet<LapId>,
}

impl Dp {
    pub fn is_expired(&self, now: i64) -> bool {
        self.valid_until <= now
    }
}

#[derive(Debug, Clone)]
pub struct Eap {
    pub prefix: Prefix,
    pub rid: Rid,
    pub iface: Option<IfaceId>,
}

#[derive(Debug, Clone)]
pub struct Lap {
    pub prefix: Prefix,
    pub iface: IfaceId,
    pub dp: DpId,
    pub own: bool,
    pub assigned: bool,
    pub flooded: bool,
    /// Set by the kernel's mark phase at the start of each pass and cleared
    /// as soon as the (iface, dp) reconciliation step re-confirms the lap;
    /// anything still set at the sweep step is destroyed.
    pub invalid: bool,
    pub delayed: Delayed,
}

#[derive(Default)]
pub struct EntityStore {
    next_id: u64,
    ifaces: HashMap<IfaceId, Iface>,
    iface_names: HashMap<String, IfaceId>,
    dps: HashMap<DpId, Dp>,
    eaps: HashMap<EapId, Eap>,
    laps: HashMap<LapId, Lap>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc<T>(&mut self, wrap: impl Fn(u64) -> T) -> T {
        self.next_id += 1;
        wrap(self.next_id)
    }

    // -- interfaces --------------------------------------------------

    pub fn iface(&self, id: IfaceId) -> Option<&Iface> {
        self.ifaces.get(&id)
    }

    pub fn iface_mut(&mut self, id: IfaceId) -> Option<&mut Iface> {
        self.ifaces.get_mut(&id)
    }

    pub fn iface_id_by_name(&self, name: &str) -> Option<IfaceId> {
        self.iface_names.get(name).copied()
    }

    pub fn ifaces(&self) -> impl Iterator<Item = (IfaceId, &Iface)> {
        self.ifaces.iter().map(|(id, i)| (*id, i))
    }

    pub fn internal_iface_ids(&self) -> Vec<IfaceId> {
        self.ifaces
            .iter()
            .filter(|(_, i)| i.internal)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn all_iface_ids(&self) -> Vec<IfaceId> {
        self.ifaces.keys().copied().collect()
    }

    pub fn get_or_create_iface(&mut self, name: &str) -> PaResult<IfaceId> {
        if name.len() >= IFNAMSIZ {
            return Err(PaError::NameTooLong);
        }
        if let Some(id) = self.iface_names.get(name) {
            return Ok(*id);
        }
        let id: IfaceId = self.alloc(IfaceId);
        self.ifaces.insert(
            id,
            Iface {
                name: name.to_string(),
                ..Default::default()
            },
        );
        self.iface_names.insert(name.to_string(), id);
        Ok(id)
    }

    /// Destroy an interface, cascading: every lap on it is destroyed, and
    /// every eap/dp still referencing it has the reference cleared.
    pub fn destroy_iface(&mut self, id: IfaceId) {
        let Some(iface) = self.ifaces.remove(&id) else {
            return;
        };
        self.iface_names.remove(&iface.name);
        for lap_id in iface.laps {
            self.destroy_lap(lap_id);
        }
        for eap_id in iface.eaps {
            if let Some(eap) = self.eaps.get_mut(&eap_id) {
                eap.iface = None;
            }
        }
        for dp_id in iface.dps {
            if let Some(dp) = self.dps.get_mut(&dp_id) {
                dp.iface = None;
            }
        }
    }

    /// Drop every lap on a non-internal interface without destroying the
    /// interface itself (used when it still carries eaps/dps).
    pub fn strip_laps(&mut self, id: IfaceId) {
        let lap_ids: Vec<LapId> = self
            .ifaces
            .get(&id)
            .map(|i| i.laps.iter().copied().collect())
            .unwrap_or_default();
        for lap_id in lap_ids {
            self.destroy_lap(lap_id);
        }
    }

    // -- delegated prefixes -------------------------------------------

    pub fn dp(&self, id: DpId) -> Option<&Dp> {
        self.dps.get(&id)
    }

    pub fn dp_mut(&mut self, id: DpId) -> Option<&mut Dp> {
        self.dps.get_mut(&id)
    }

    pub fn dps(&self) -> impl Iterator<Item = (DpId, &Dp)> {
        self.dps.iter().map(|(id, d)| (*id, d))
    }

    pub fn find_dp(&self, prefix: &Prefix, owner: &DpOwner) -> Option<DpId> {
        self.dps
            .iter()
            .find(|(_, d)| d.prefix == *prefix && d.owner == *owner)
            .map(|(id, _)| *id)
    }

    pub fn create_dp(&mut self, dp: Dp, delegating_iface: Option<IfaceId>) -> DpId {
        let id: DpId = self.alloc(DpId);
        if let Some(iface_id) = delegating_iface {
            if let Some(iface) = self.ifaces.get_mut(&iface_id) {
                iface.dps.insert(id);
            }
        }
        self.dps.insert(id, dp);
        id
    }

    /// Destroy a dp: any lap anchored to it is re-parented to another dp
    /// that still contains its prefix, or destroyed if none does.
    pub fn destroy_dp(&mut self, id: DpId) {
        let Some(dp) = self.dps.remove(&id) else {
            return;
        };
        if let Some(iface_id) = dp.iface {
            if let Some(iface) = self.ifaces.get_mut(&iface_id) {
                iface.dps.remove(&id);
            }
        }
        for lap_id in dp.laps {
            let lap_prefix = self.laps.get(&lap_id).map(|l| l.prefix);
            let Some(lap_prefix) = lap_prefix else { continue };
            let foster = self
                .dps
                .iter()
                .find(|(_, d)| d.prefix.contains(&lap_prefix))
                .map(|(id, _)| *id);
            match foster {
                Some(new_dp) => {
                    if let Some(lap) = self.laps.get_mut(&lap_id) {
                        lap.dp = new_dp;
                    }
                    self.dps.get_mut(&new_dp).unwrap().laps.insert(lap_id);
                }
                None => self.destroy_lap(lap_id),
            }
        }
    }

    // -- external assigned prefixes -------------------------------------

    pub fn eap(&self, id: EapId) -> Option<&Eap> {
        self.eaps.get(&id)
    }

    pub fn eaps(&self) -> impl Iterator<Item = (EapId, &Eap)> {
        self.eaps.iter().map(|(id, e)| (*id, e))
    }

    pub fn eaps_on_iface<'a>(&'a self, iface: IfaceId) -> impl Iterator<Item = (EapId, &'a Eap)> {
        self.eaps.iter().filter(move |(_, e)| e.iface == Some(iface)).map(|(id, e)| (*id, e))
    }

    pub fn find_eap(&self, prefix: &Prefix, rid: &Rid) -> Option<EapId> {
        self.eaps
            .iter()
            .find(|(_, e)| e.prefix == *prefix && e.rid == *rid)
            .map(|(id, _)| *id)
    }

    pub fn create_eap(&mut self, eap: Eap) -> EapId {
        let id: EapId = self.alloc(EapId);
        if let Some(iface_id) = eap.iface {
            if let Some(iface) = self.ifaces.get_mut(&iface_id) {
                iface.eaps.insert(id);
            }
        }
        self.eaps.insert(id, eap);
        id
    }

    pub fn destroy_eap(&mut self, id: EapId) {
        let Some(eap) = self.eaps.remove(&id) else {
            return;
        };
        if let Some(iface_id) = eap.iface {
            if let Some(iface) = self.ifaces.get_mut(&iface_id) {
                iface.eaps.remove(&id);
            }
        }
    }

    // -- locally assigned prefixes ---------------------------------------

    pub fn lap(&self, id: LapId) -> Option<&Lap> {
        self.laps.get(&id)
    }

    pub fn lap_mut(&mut self, id: LapId) -> Option<&mut Lap> {
        self.laps.get_mut(&id)
    }

    pub fn laps(&self) -> impl Iterator<Item = (LapId, &Lap)> {
        self.laps.iter().map(|(id, l)| (*id, l))
    }

    pub fn laps_on_iface<'a>(&'a self, iface: IfaceId) -> impl Iterator<Item = (LapId, &'a Lap)> {
        self.laps.iter().filter(move |(_, l)| l.iface == iface).map(|(id, l)| (*id, l))
    }

    pub fn mark_all_invalid(&mut self) {
        for lap in self.laps.values_mut() {
            lap.invalid = true;
        }
    }

    pub fn sweep_invalid(&mut self) {
        let to_delete: Vec<LapId> = self
            .laps
            .iter()
            .filter(|(_, l)| l.invalid)
            .map(|(id, _)| *id)
            .collect();
        for id in to_delete {
            self.destroy_lap(id);
        }
    }

    pub fn create_lap(&mut self, lap: Lap) -> LapId {
        let id: LapId = self.alloc(LapId);
        if let Some(iface) = self.ifaces.get_mut(&lap.iface) {
            iface.laps.insert(id);
        }
        if let Some(dp) = self.dps.get_mut(&lap.dp) {
            dp.laps.insert(id);
        }
        self.laps.insert(id, lap);
        id
    }

    pub fn set_lap_dp(&mut self, id: LapId, new_dp: DpId) {
        let Some(old_dp) = self.laps.get(&id).map(|l| l.dp) else { return };
        if old_dp == new_dp {
            return;
        }
        if let Some(dp) = self.dps.get_mut(&old_dp) {
            dp.laps.remove(&id);
        }
        if let Some(dp) = self.dps.get_mut(&new_dp) {
            dp.laps.insert(id);
        }
        if let Some(lap) = self.laps.get_mut(&id) {
            lap.dp = new_dp;
        }
    }

    pub fn destroy_lap(&mut self, id: LapId) {
        let Some(lap) = self.laps.remove(&id) else {
            return;
        };
        if let Some(iface) = self.ifaces.get_mut(&lap.iface) {
            iface.laps.remove(&id);
        }
        if let Some(dp) = self.dps.get_mut(&lap.dp) {
            dp.laps.remove(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefix::Prefix;

    fn pfx(s: &str) -> Prefix {
        let net: ipnet::Ipv6Net = s.parse().unwrap();
        Prefix::from_v6net(net)
    }

    #[test]
    fn iface_destroy_cascades_to_laps() {
        let mut store = EntityStore::new();
        let iface = store.get_or_create_iface("lan0").unwrap();
        let dp_id = store.create_dp(
            Dp {
                prefix: pfx("2001:db8::/48"),
                owner: DpOwner::Local { generator: None },
                valid_until: 1000,
                preferred_until: 900,
                excluded: None,
                dhcp: None,
                iface: None,
                laps: Default::default(),
            },
            None,
        );
        let lap_id = store.create_lap(Lap {
            prefix: pfx("2001:db8::/64"),
            iface,
            dp: dp_id,
            own: true,
            assigned: false,
            flooded: false,
            invalid: false,
            delayed: Delayed::default(),
        });
        assert!(store.lap(lap_id).is_some());
        store.destroy_iface(iface);
        assert!(store.lap(lap_id).is_none());
        assert!(store.dp(dp_id).unwrap().laps.is_empty());
    }

    #[test]
    fn dp_destroy_refosters_contained_lap() {
        let mut store = EntityStore::new();
        let iface = store.get_or_create_iface("lan0").unwrap();
        let wide = store.create_dp(
            Dp {
                prefix: pfx("2001:db8::/32"),
                owner: DpOwner::Local { generator: None },
                valid_until: 1000,
                preferred_until: 900,
                excluded: None,
                dhcp: None,
                iface: None,
                laps: Default::default(),
            },
            None,
        );
        let narrow = store.create_dp(
            Dp {
                prefix: pfx("2001:db8::/48"),
                owner: DpOwner::Local { generator: None },
                valid_until: 1000,
                preferred_until: 900,
                excluded: None,
                dhcp: None,
                iface: None,
                laps: Default::default(),
            },
            None,
        );
        let lap_id = store.create_lap(Lap {
            prefix: pfx("2001:db8::/64"),
            iface,
            dp: narrow,
            own: true,
            assigned: false,
            flooded: false,
            invalid: false,
            delayed: Delayed::default(),
        });
        store.destroy_dp(narrow);
        assert_eq!(store.lap(lap_id).unwrap().dp, wide);
    }

    #[test]
    fn mark_and_sweep_destroys_unconfirmed_laps() {
        let mut store = EntityStore::new();
        let iface = store.get_or_create_iface("lan0").unwrap();
        let dp_id = store.create_dp(
            Dp {
                prefix: pfx("2001:db8::/48"),
                owner: DpOwner::Local { generator: None },
                valid_until: 1000,
                preferred_until: 900,
                excluded: None,
                dhcp: None,
                iface: None,
                laps: Default::default(),
            },
            None,
        );
        let lap_id = store.create_lap(Lap {
            prefix: pfx("2001:db8::/64"),
            iface,
            dp: dp_id,
            own: true,
            assigned: false,
            flooded: false,
            invalid: false,
            delayed: Delayed::default(),
        });
        store.mark_all_invalid();
        store.sweep_invalid();
        assert!(store.lap(lap_id).is_none());
    }

    #[test]
    fn iface_name_too_long_rejected() {
        let mut store = EntityStore::new();
        let err = store.get_or_create_iface("this-name-is-way-too-long-for-ifnamsiz");
        assert!(matches!(err, Err(PaError::NameTooLong)));
    }
}
