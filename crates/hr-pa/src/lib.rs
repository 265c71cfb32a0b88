//! Prefix assignment: given delegated prefixes learned locally and prefix
//! assignments flooded by peers, produce a stable, collision-free set of
//! on-link prefixes per internal interface.
//!
//! `Paa` is the entry point. It owns the entity store and local-prefix
//! generators and is driven by a single task: external layers call its
//! `update_*`/`interface_*` methods to feed in events, `schedule()` asks
//! for a pass, and `run_pass()` (normally invoked by [`scheduler`]) does
//! the reconciliation work and emits callbacks through the `FloodingSink`
//! and `InterfaceSink` the caller supplied at construction.

pub mod callbacks;
pub mod config;
pub mod error;
pub mod kernel;
pub mod local;
pub mod ownership;
pub mod prefix;
pub mod scheduler;
pub mod store;
pub mod timer;

pub use callbacks::{FloodingSink, InterfaceSink, NullStorage, Storage};
pub use config::{PaConf, PaaVariant};
pub use error::{PaError, PaResult};
pub use prefix::Prefix;
pub use scheduler::{Mutation, MutationSender};
pub use store::{DpId, EapId, IfaceId, LapId, Rid};

use rand::Rng;

use local::LocalGenerator;
use store::{Dp, DpOwner, Eap, EntityStore, LocalGenKind};

/// The prefix-assignment engine for one router.
///
/// Generic over the three external collaborators so tests can plug in
/// recording fakes and a production binary can plug in the real flooding
/// transport, netlink-backed interface layer, and on-disk storage.
pub struct Paa<F, I, S> {
    conf: PaConf,
    rid: Rid,
    store: EntityStore,
    ula_gen: LocalGenerator,
    ipv4_gen: LocalGenerator,
    ipv4_available: bool,
    scheduled: bool,
    next_dp_expiry: Option<i64>,
    pub flooding: F,
    pub iface: I,
    pub storage: S,
}

impl<F: FloodingSink, I: InterfaceSink, S: Storage> Paa<F, I, S> {
    pub fn new(conf: PaConf, rid: Rid, flooding: F, iface: I, storage: S) -> PaResult<Self> {
        conf.validate()?;
        Ok(Self {
            conf,
            rid,
            store: EntityStore::new(),
            ula_gen: LocalGenerator::new(LocalGenKind::Ula),
            ipv4_gen: LocalGenerator::new(LocalGenKind::Ipv4),
            ipv4_available: false,
            scheduled: false,
            next_dp_expiry: None,
            flooding,
            iface,
            storage,
        })
    }

    pub fn rid(&self) -> Rid {
        self.rid
    }

    pub fn conf(&self) -> &PaConf {
        &self.conf
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// Request a reconciliation pass. Idempotent: repeated calls before the
    /// next `run_pass` collapse to one.
    pub fn schedule(&mut self) {
        self.scheduled = true;
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// The earliest time the caller should next invoke `run_pass`: the
    /// coalesced short wakeup if a pass is pending, the earliest per-lap
    /// delayed-action deadline, or the next dp expiry, whichever is
    /// soonest.
    pub fn next_wakeup(&self, now: i64, short_delay_s: i64) -> Option<i64> {
        let scheduled_at = self.scheduled.then_some(now + short_delay_s);
        let lap_deadline = self.store.laps().filter_map(|(_, l)| l.delayed.next_wakeup()).min();
        [scheduled_at, lap_deadline, self.next_dp_expiry].into_iter().flatten().min()
    }

    pub fn run_pass(&mut self, now: i64, rng: &mut impl Rng) {
        kernel::run_pass(self, now, rng);
    }

    // -- consumed from the flooding layer ---------------------------------

    pub fn update_eap(&mut self, prefix: Prefix, rid: Rid, ifname: Option<&str>, to_delete: bool) -> PaResult<()> {
        let iface = match ifname {
            Some(name) => Some(self.store.get_or_create_iface(name)?),
            None => None,
        };
        let existing = self.store.find_eap(&prefix, &rid);
        match (existing, to_delete) {
            (Some(id), true) => self.store.destroy_eap(id),
            (Some(id), false) => {
                // Idempotent: only touch the interface link if it actually
                // changed.
                if self.store.eap(id).and_then(|e| e.iface) != iface {
                    self.store.destroy_eap(id);
                    self.store.create_eap(Eap { prefix, rid, iface });
                } else {
                    return Ok(());
                }
            }
            (None, true) => return Ok(()),
            (None, false) => {
                self.store.create_eap(Eap { prefix, rid, iface });
            }
        }
        self.schedule();
        Ok(())
    }

    pub fn update_edp(
        &mut self,
        prefix: Prefix,
        rid: Option<Rid>,
        excluded: Option<Prefix>,
        valid_until: i64,
        preferred_until: i64,
        dhcp: Option<Vec<u8>>,
    ) -> PaResult<()> {
        let rid = rid.ok_or(PaError::BadArgument("update_edp requires a peer rid"))?;
        let valid_until = valid_until.max(0);
        let owner = DpOwner::Peer(rid);

        if valid_until == 0 {
            if let Some(id) = self.store.find_dp(&prefix, &owner) {
                self.store.destroy_dp(id);
                self.schedule();
            }
            return Ok(());
        }

        match self.store.find_dp(&prefix, &owner) {
            Some(id) => {
                if let Some(dp) = self.store.dp_mut(id) {
                    if dp.valid_until != valid_until
                        || dp.preferred_until != preferred_until
                        || dp.excluded != excluded
                        || dp.dhcp != dhcp
                    {
                        dp.valid_until = valid_until;
                        dp.preferred_until = preferred_until;
                        dp.excluded = excluded;
                        dp.dhcp = dhcp;
                        self.schedule();
                    }
                }
            }
            None => {
                self.store.create_dp(
                    Dp {
                        prefix,
                        owner,
                        valid_until,
                        preferred_until,
                        excluded,
                        dhcp,
                        iface: None,
                        laps: Default::default(),
                    },
                    None,
                );
                self.schedule();
            }
        }
        Ok(())
    }

    // -- consumed from the interface-management layer ---------------------

    pub fn interface_internal(&mut self, ifname: &str, enabled: bool) -> PaResult<()> {
        let id = self.store.get_or_create_iface(ifname)?;
        if let Some(iface) = self.store.iface_mut(id) {
            if iface.internal != enabled {
                iface.internal = enabled;
                self.schedule();
            }
        }
        Ok(())
    }

    pub fn prefix_delegated(
        &mut self,
        ifname: &str,
        prefix: Prefix,
        excluded: Option<Prefix>,
        valid_until: i64,
        preferred_until: i64,
        dhcp: Option<Vec<u8>>,
    ) -> PaResult<()> {
        let iface_id = self.store.get_or_create_iface(ifname)?;
        let valid_until = valid_until.max(0);
        let owner = DpOwner::Local { generator: None };

        if valid_until == 0 {
            if let Some(id) = self.store.find_dp(&prefix, &owner) {
                self.store.destroy_dp(id);
                self.schedule();
            }
            return Ok(());
        }

        match self.store.find_dp(&prefix, &owner) {
            Some(id) => {
                if let Some(dp) = self.store.dp_mut(id) {
                    dp.valid_until = valid_until;
                    dp.preferred_until = preferred_until;
                    dp.excluded = excluded;
                    dp.dhcp = dhcp;
                }
            }
            None => {
                self.store.create_dp(
                    Dp {
                        prefix,
                        owner,
                        valid_until,
                        preferred_until,
                        excluded,
                        dhcp,
                        iface: Some(iface_id),
                        laps: Default::default(),
                    },
                    Some(iface_id),
                );
            }
        }
        self.schedule();
        Ok(())
    }

    pub fn ipv4_uplink(&mut self, available: bool) {
        if self.ipv4_available != available {
            self.ipv4_available = available;
            self.schedule();
        }
    }

    pub fn set_rid(&mut self, rid: Rid) {
        if self.rid != rid {
            self.rid = rid;
            self.schedule();
        }
    }
}

/// Initializes a `tracing` subscriber suitable for tests and example
/// binaries exercising this crate directly; real daemons set up their own
/// subscriber the way `hr-host-agent` does.
#[cfg(feature = "testing")]
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,hr_pa=debug".parse().unwrap()))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbacks::NullStorage;

    #[derive(Default)]
    struct RecordingFlooding {
        laps: Vec<(Prefix, String, bool)>,
    }

    impl FloodingSink for RecordingFlooding {
        fn updated_lap(&mut self, prefix: Prefix, ifname: &str, to_delete: bool) {
            self.laps.push((prefix, ifname.to_string(), to_delete));
        }

        fn updated_ldp(&mut self, _prefix: Prefix, _excluded: Option<Prefix>, _ifname: Option<&str>, _valid_until: i64, _preferred_until: i64, _dhcp: Option<&[u8]>) {}
    }

    #[derive(Default)]
    struct RecordingInterface {
        assigned: Vec<(Prefix, String, bool)>,
    }

    impl InterfaceSink for RecordingInterface {
        fn update_prefix(&mut self, prefix: Prefix, ifname: &str, _valid_until: i64, _preferred_until: i64, _dhcp: Option<&[u8]>, withdraw: bool) {
            self.assigned.push((prefix, ifname.to_string(), withdraw));
        }

        fn update_link_owner(&mut self, _ifname: &str, _do_dhcp: bool) {}
    }

    fn rid(b: u8) -> Rid {
        let mut id = [0u8; 16];
        id[15] = b;
        Rid(id)
    }

    fn test_paa() -> Paa<RecordingFlooding, RecordingInterface, NullStorage> {
        Paa::new(PaConf::default(), rid(1), RecordingFlooding::default(), RecordingInterface::default(), NullStorage::default()).unwrap()
    }

    #[test]
    fn new_rejects_bad_config() {
        let conf = PaConf {
            use_random_ula: false,
            ..Default::default()
        };
        let result = Paa::new(conf, rid(1), RecordingFlooding::default(), RecordingInterface::default(), NullStorage::default());
        assert!(result.is_err());
    }

    #[test]
    fn update_eap_schedules_a_pass() {
        let mut paa = test_paa();
        assert!(!paa.is_scheduled());
        let prefix = Prefix::from_v6net("2001:db8::/48".parse().unwrap());
        paa.update_eap(prefix, rid(2), Some("lan0"), false).unwrap();
        assert!(paa.is_scheduled());
    }

    #[test]
    fn update_edp_rejects_missing_rid() {
        let mut paa = test_paa();
        let prefix = Prefix::from_v6net("2001:db8::/48".parse().unwrap());
        let err = paa.update_edp(prefix, None, None, 1000, 900, None);
        assert!(err.is_err());
    }

    #[test]
    fn own_lap_created_and_assigned_after_delay() {
        let mut paa = test_paa();
        let mut rng = rand::rng();

        paa.interface_internal("lan0", true).unwrap();
        let dp = Prefix::from_v6net("2001:db8::/48".parse().unwrap());
        paa.prefix_delegated("wan0", dp, None, 100_000, 90_000, None).unwrap();

        // No competing eap on lan0, so the storage/random fallback is gated
        // by `link_highest_rid` alone and fires on the very first pass.
        paa.run_pass(0, &mut rng);
        assert_eq!(paa.store().laps().count(), 1, "a lap should appear for the only internal interface");

        let assign_at = paa.conf().assign_delay().num_seconds();
        paa.schedule();
        paa.run_pass(assign_at, &mut rng);

        assert_eq!(paa.iface.assigned.len(), 1);
        assert!(!paa.iface.assigned[0].2, "assign transition should apply, not withdraw");
    }
}
