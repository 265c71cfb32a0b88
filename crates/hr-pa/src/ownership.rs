//! The two ownership-resolution policies the kernel can run under,
//! selected once at `Paa::new` rather than compiled in. Both govern the
//! same two decisions: whether to claim ownership of a prefix we're
//! adopting from a peer's advertisement, and whether to hold off creating
//! an assignment when the prefix we'd pick collides with one a peer is
//! already advertising.

use crate::config::PaaVariant;

/// Step 7 of the kernel pass: adopting a peer's advertised prefix on this
/// link, should we also claim ownership of it (become the advertiser)?
pub fn claim_on_adopt(variant: PaaVariant, link_highest_rid: bool, designated: bool) -> bool {
    match variant {
        PaaVariant::Arkko => false,
        PaaVariant::Pfister => link_highest_rid && designated,
    }
}

/// When the prefix we would otherwise assign collides with a peer's
/// advertisement, should we abstain this pass and wait for the collision
/// to resolve via flooding?
pub fn wait_for_neighbour(variant: PaaVariant, designated: bool) -> bool {
    match variant {
        PaaVariant::Arkko => true,
        PaaVariant::Pfister => !designated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arkko_never_claims() {
        assert!(!claim_on_adopt(PaaVariant::Arkko, true, true));
        assert!(!claim_on_adopt(PaaVariant::Arkko, false, false));
    }

    #[test]
    fn pfister_claims_only_when_highest_rid_and_designated() {
        assert!(claim_on_adopt(PaaVariant::Pfister, true, true));
        assert!(!claim_on_adopt(PaaVariant::Pfister, true, false));
        assert!(!claim_on_adopt(PaaVariant::Pfister, false, true));
    }

    #[test]
    fn arkko_always_waits_for_neighbour() {
        assert!(wait_for_neighbour(PaaVariant::Arkko, true));
        assert!(wait_for_neighbour(PaaVariant::Arkko, false));
    }

    #[test]
    fn pfister_waits_only_when_not_designated() {
        assert!(!wait_for_neighbour(PaaVariant::Pfister, true));
        assert!(wait_for_neighbour(PaaVariant::Pfister, false));
    }
}
