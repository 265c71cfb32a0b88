//! Local-prefix generation: the ULA and IPv4 state machines that decide
//! whether this router should synthesise a delegated prefix when none is
//! learned from upstream. Both generators share the same `status -> create
//! -> update` shape; only their classification and prefix-sourcing differ.
//!
//! The source implementation dereferences the best-known-dp pointer before
//! checking it for null when computing IPv4 status. Here that can't happen:
//! the "best peer dp" is an `Option<Rid>` and every field access goes
//! through it.

use rand::Rng;

use crate::callbacks::Storage;
use crate::config::PaConf;
use crate::prefix::Prefix;
use crate::store::{Dp, DpId, DpOwner, EntityStore, LocalGenKind, Rid};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Status {
    pub can_create: bool,
    pub can_keep: bool,
}

pub fn has_global_highest_rid(store: &EntityStore, our_rid: Rid) -> bool {
    let beaten_by_eap = store.eaps().any(|(_, e)| e.rid > our_rid);
    let beaten_by_dp = store
        .dps()
        .any(|(_, d)| matches!(&d.owner, DpOwner::Peer(rid) if *rid > our_rid));
    !beaten_by_eap && !beaten_by_dp
}

fn has_global_v6_dp(store: &EntityStore) -> bool {
    store.dps().any(|(_, d)| d.prefix.is_global_v6())
}

fn best_peer_rid(store: &EntityStore, classify: impl Fn(&Prefix) -> bool) -> Option<Rid> {
    store
        .dps()
        .filter(|(_, d)| classify(&d.prefix))
        .filter_map(|(_, d)| d.owner.rid())
        .max()
}

#[derive(Debug, Clone)]
pub struct LocalGenerator {
    kind: LocalGenKind,
    dp: Option<DpId>,
    create_armed_at: Option<i64>,
    next_timeout: Option<i64>,
}

impl LocalGenerator {
    pub fn new(kind: LocalGenKind) -> Self {
        Self {
            kind,
            dp: None,
            create_armed_at: None,
            next_timeout: None,
        }
    }

    pub fn status(&self, store: &EntityStore, conf: &PaConf, our_rid: Rid, ipv4_available: bool) -> Status {
        let (enabled, no_if_glb_v6, classify): (bool, bool, fn(&Prefix) -> bool) = match self.kind {
            LocalGenKind::Ula => (conf.use_ula, conf.no_ula_if_glb_ipv6, Prefix::is_ula),
            LocalGenKind::Ipv4 => (
                conf.use_ipv4 && ipv4_available,
                conf.no_ipv4_if_glb_ipv6,
                Prefix::is_ipv4,
            ),
        };

        if !enabled || store.internal_iface_ids().is_empty() {
            return Status::default();
        }
        if no_if_glb_v6 && has_global_v6_dp(store) {
            return Status::default();
        }

        let best_rid = best_peer_rid(store, classify);
        if let Some(rid) = best_rid {
            if rid > our_rid {
                // A peer with a higher rid already owns a prefix of this
                // kind; defer to them entirely.
                return Status::default();
            }
        }

        let can_create = best_rid.is_none() && has_global_highest_rid(store, our_rid);
        Status { can_create, can_keep: true }
    }

    /// Run one pass of this generator's state machine. `now` and the create
    /// delay are in absolute/duration seconds.
    pub fn run(
        &mut self,
        store: &mut EntityStore,
        storage: &mut dyn Storage,
        conf: &PaConf,
        our_rid: Rid,
        ipv4_available: bool,
        now: i64,
        rng: &mut impl Rng,
    ) {
        let status = self.status(store, conf, our_rid, ipv4_available);

        match self.dp {
            Some(dp_id) if !status.can_keep => {
                store.destroy_dp(dp_id);
                self.dp = None;
                self.next_timeout = None;
            }
            Some(dp_id) => {
                if self.next_timeout.is_none_or(|t| now >= t) {
                    self.refresh(store, dp_id, conf, now);
                }
            }
            None if status.can_create => {
                let delay = conf.assign_delay().num_seconds();
                match self.create_armed_at {
                    None => self.create_armed_at = Some(now + delay),
                    Some(t) if now >= t => {
                        let dp_id = self.create(store, storage, conf, rng);
                        self.refresh(store, dp_id, conf, now);
                        self.dp = Some(dp_id);
                        self.create_armed_at = None;
                    }
                    Some(_) => {}
                }
            }
            None => {
                self.create_armed_at = None;
            }
        }
    }

    fn refresh(&mut self, store: &mut EntityStore, dp_id: DpId, conf: &PaConf, now: i64) {
        let valid_until = now + conf.local_valid_s as i64;
        let preferred_until = now + conf.local_preferred_s as i64;
        if let Some(dp) = store.dp_mut(dp_id) {
            dp.valid_until = valid_until;
            dp.preferred_until = preferred_until;
        }
        self.next_timeout = Some(valid_until - conf.local_update_delay_s as i64);
    }

    fn create(&self, store: &mut EntityStore, storage: &mut dyn Storage, conf: &PaConf, rng: &mut impl Rng) -> DpId {
        let prefix = match self.kind {
            LocalGenKind::Ula => {
                if conf.use_random_ula {
                    storage.ula_get().unwrap_or_else(|| {
                        let base = Prefix::new(std::net::Ipv6Addr::from(0xfc00u128 << 112), 7);
                        let drawn = base.random_subprefix(conf.random_ula_plen, rng);
                        storage.ula_set(drawn);
                        drawn
                    })
                } else {
                    parse_v6_prefix(conf.fixed_ula_prefix.as_deref().unwrap_or("fd00::/48"))
                }
            }
            LocalGenKind::Ipv4 => parse_v4_prefix(&conf.v4_prefix),
        };

        store.create_dp(
            Dp {
                prefix,
                owner: DpOwner::Local {
                    generator: Some(self.kind),
                },
                valid_until: 0,
                preferred_until: 0,
                excluded: None,
                dhcp: None,
                iface: None,
                laps: Default::default(),
            },
            None,
        )
    }
}

fn parse_v6_prefix(s: &str) -> Prefix {
    let net: ipnet::Ipv6Net = s.parse().expect("configured ULA prefix must be a valid IPv6 CIDR");
    Prefix::from_v6net(net)
}

fn parse_v4_prefix(s: &str) -> Prefix {
    let net: ipnet::Ipv4Net = s.parse().expect("configured IPv4 prefix must be a valid IPv4 CIDR");
    Prefix::from_ipv4(net.addr(), net.prefix_len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callbacks::NullStorage;

    fn rid(b: u8) -> Rid {
        let mut id = [0u8; 16];
        id[15] = b;
        Rid(id)
    }

    #[test]
    fn ula_status_off_when_disabled() {
        let store = EntityStore::new();
        let conf = PaConf {
            use_ula: false,
            ..Default::default()
        };
        let gen = LocalGenerator::new(LocalGenKind::Ula);
        let status = gen.status(&store, &conf, rid(1), false);
        assert_eq!(status, Status::default());
    }

    #[test]
    fn ula_status_requires_internal_iface() {
        let store = EntityStore::new();
        let conf = PaConf::default();
        let gen = LocalGenerator::new(LocalGenKind::Ula);
        assert_eq!(gen.status(&store, &conf, rid(1), false), Status::default());
    }

    #[test]
    fn ula_can_create_when_highest_rid_and_no_peer_dp() {
        let mut store = EntityStore::new();
        let iface = store.get_or_create_iface("lan0").unwrap();
        store.iface_mut(iface).unwrap().internal = true;
        let conf = PaConf::default();
        let gen = LocalGenerator::new(LocalGenKind::Ula);
        let status = gen.status(&store, &conf, rid(9), false);
        assert!(status.can_create);
        assert!(status.can_keep);
    }

    #[test]
    fn ula_defers_to_higher_rid_peer_dp() {
        let mut store = EntityStore::new();
        let iface = store.get_or_create_iface("lan0").unwrap();
        store.iface_mut(iface).unwrap().internal = true;
        store.create_dp(
            Dp {
                prefix: {
                    let net: ipnet::Ipv6Net = "fd00::/48".parse().unwrap();
                    Prefix::from_v6net(net)
                },
                owner: DpOwner::Peer(rid(200)),
                valid_until: 1_000_000,
                preferred_until: 900_000,
                excluded: None,
                dhcp: None,
                iface: None,
                laps: Default::default(),
            },
            None,
        );
        let conf = PaConf::default();
        let gen = LocalGenerator::new(LocalGenKind::Ula);
        let status = gen.status(&store, &conf, rid(9), false);
        assert_eq!(status, Status::default());
    }

    #[test]
    fn create_after_arming_delay_elapses() {
        let mut store = EntityStore::new();
        let iface = store.get_or_create_iface("lan0").unwrap();
        store.iface_mut(iface).unwrap().internal = true;
        let conf = PaConf::default();
        let mut gen = LocalGenerator::new(LocalGenKind::Ula);
        let mut storage = NullStorage::default();
        let mut rng = rand::rng();

        gen.run(&mut store, &mut storage, &conf, rid(9), false, 0, &mut rng);
        assert!(gen.dp.is_none(), "must wait out the create delay first");

        let delay = conf.assign_delay().num_seconds();
        gen.run(&mut store, &mut storage, &conf, rid(9), false, delay, &mut rng);
        assert!(gen.dp.is_some());
    }
}
