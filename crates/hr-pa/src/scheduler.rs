//! Drives a [`Paa`] from a single cooperative task: external layers push
//! mutations in over an `mpsc` channel, a short coalesced timer turns a
//! pending `schedule()` into a `run_pass`, and a long wakeup pegged to the
//! next lap deadline or dp expiry keeps the engine ticking even with no
//! new input. Mirrors the wait-on-timer-or-channel shape `hr-ipv6::ra`
//! uses to drive router-advertisement sends off a watch channel.

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::callbacks::{FloodingSink, InterfaceSink, Storage};
use crate::error::PaResult;
use crate::store::Rid;
use crate::{Paa, Prefix};

/// A single external input, applied to the engine in order of arrival.
pub enum Mutation {
    UpdateEap {
        prefix: Prefix,
        rid: Rid,
        ifname: Option<String>,
        to_delete: bool,
    },
    UpdateEdp {
        prefix: Prefix,
        rid: Option<Rid>,
        excluded: Option<Prefix>,
        valid_until: i64,
        preferred_until: i64,
        dhcp: Option<Vec<u8>>,
    },
    InterfaceInternal {
        ifname: String,
        enabled: bool,
    },
    PrefixDelegated {
        ifname: String,
        prefix: Prefix,
        excluded: Option<Prefix>,
        valid_until: i64,
        preferred_until: i64,
        dhcp: Option<Vec<u8>>,
    },
    Ipv4Uplink {
        available: bool,
    },
}

pub type MutationSender = mpsc::UnboundedSender<Mutation>;

/// Short coalescing window between a `schedule()` request and the pass that
/// serves it; keeps a burst of related mutations (e.g. several `update_eap`
/// calls from one flood packet) inside a single reconciliation pass.
const COALESCE_WINDOW: Duration = Duration::from_millis(50);

/// Upper bound on how long the loop can sleep with nothing scheduled and no
/// dp expiry pending, so a stalled clock source doesn't wedge it forever.
const IDLE_FALLBACK: Duration = Duration::from_secs(60);

fn apply(mutation: Mutation, paa: &mut Paa<impl FloodingSink, impl InterfaceSink, impl Storage>) -> PaResult<()> {
    match mutation {
        Mutation::UpdateEap { prefix, rid, ifname, to_delete } => {
            paa.update_eap(prefix, rid, ifname.as_deref(), to_delete)
        }
        Mutation::UpdateEdp { prefix, rid, excluded, valid_until, preferred_until, dhcp } => {
            paa.update_edp(prefix, rid, excluded, valid_until, preferred_until, dhcp)
        }
        Mutation::InterfaceInternal { ifname, enabled } => paa.interface_internal(&ifname, enabled),
        Mutation::PrefixDelegated {
            ifname,
            prefix,
            excluded,
            valid_until,
            preferred_until,
            dhcp,
        } => paa.prefix_delegated(&ifname, prefix, excluded, valid_until, preferred_until, dhcp),
        Mutation::Ipv4Uplink { available } => {
            paa.ipv4_uplink(available);
            Ok(())
        }
    }
}

/// Runs until `mutations` is closed. `now` supplies wall-clock seconds (a
/// trait object so tests can drive it without sleeping real time).
pub async fn run<F, I, S>(
    paa: &mut Paa<F, I, S>,
    mut mutations: mpsc::UnboundedReceiver<Mutation>,
    mut now: impl FnMut() -> i64,
    mut rng: impl Rng,
) where
    F: FloodingSink,
    I: InterfaceSink,
    S: Storage,
{
    loop {
        let wakeup = paa.next_wakeup(now(), COALESCE_WINDOW.as_secs() as i64);
        let sleep_for = match wakeup {
            Some(at) => Duration::from_secs(at.saturating_sub(now()).max(0) as u64),
            None => IDLE_FALLBACK,
        };

        tokio::select! {
            mutation = mutations.recv() => {
                match mutation {
                    Some(m) => {
                        if let Err(err) = apply(m, paa) {
                            warn!("rejected prefix-assignment mutation: {err}");
                        }
                    }
                    None => {
                        debug!("mutation channel closed, stopping prefix-assignment scheduler");
                        return;
                    }
                }
            }
            _ = tokio::time::sleep(sleep_for) => {}
        }

        paa.run_pass(now(), &mut rng);
    }
}
