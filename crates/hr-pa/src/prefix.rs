//! Prefix arithmetic: containment, classification, and the bounded random
//! sub-prefix search used by the kernel's assignment step.
//!
//! IPv4 is represented internally as an IPv4-mapped IPv6 prefix (length
//! `96 + n`), the same representation `hr-ipv6::pd_client` uses when it
//! writes delegated-prefix subnets into an `Ipv6Addr` via bit placement.
//! `ipnet` gives us containment and parsing for free; the random draw and
//! the wraparound-aware increment need raw `u128` arithmetic that `ipnet`
//! doesn't expose.

use std::net::{Ipv4Addr, Ipv6Addr};

use ipnet::Ipv6Net;
use rand::Rng;

pub const PREFIX_SEARCH_MAX_ROUNDS: u32 = 128;

const V4_MAPPED_PREFIX: u128 = 0x0000_0000_0000_0000_0000_ffff_0000_0000;
const V4_MAPPED_LEN: u8 = 96;

/// A prefix, IPv4 always represented as an IPv4-mapped IPv6 prefix of
/// length >= 96.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    addr: u128,
    len: u8,
}

impl Prefix {
    pub fn new(addr: Ipv6Addr, len: u8) -> Self {
        Self {
            addr: mask(u128::from(addr), len),
            len,
        }
    }

    pub fn from_ipv4(addr: Ipv4Addr, len: u8) -> Self {
        let mapped = V4_MAPPED_PREFIX | (u32::from(addr) as u128);
        Self::new(Ipv6Addr::from(mapped), V4_MAPPED_LEN + len)
    }

    pub fn from_v6net(net: Ipv6Net) -> Self {
        Self::new(net.addr(), net.prefix_len())
    }

    pub fn addr(&self) -> Ipv6Addr {
        Ipv6Addr::from(self.addr)
    }

    pub fn len(&self) -> u8 {
        self.len
    }

    pub fn is_ipv4(&self) -> bool {
        self.len >= V4_MAPPED_LEN && (self.addr >> 32) << 32 == V4_MAPPED_PREFIX
    }

    pub fn ipv4_len(&self) -> Option<u8> {
        self.is_ipv4().then(|| self.len - V4_MAPPED_LEN)
    }

    /// fc00::/7, the ULA block.
    pub fn is_ula(&self) -> bool {
        !self.is_ipv4() && (self.addr >> 121) == (0xfc00_u128 >> 9)
    }

    /// A "global" (non-ULA, non-link-local, non-v4) IPv6 prefix.
    pub fn is_global_v6(&self) -> bool {
        !self.is_ipv4() && !self.is_ula()
    }

    /// True iff `self` fully contains `other` (self is the wider or equal prefix).
    pub fn contains(&self, other: &Prefix) -> bool {
        self.len <= other.len && mask(other.addr, self.len) == self.addr
    }

    pub fn contains_exact_or_wider(&self, other: &Prefix) -> bool {
        self.contains(other)
    }

    pub fn overlaps(&self, other: &Prefix) -> bool {
        self.contains(other) || other.contains(self)
    }

    /// The assignment length the kernel should use under this delegated
    /// prefix: /64 for IPv6 DPs of plen <= 64, /120 for IPv4 DPs.
    pub fn assignment_len(&self) -> Option<u8> {
        if self.is_ipv4() {
            Some(V4_MAPPED_LEN + 24)
        } else if self.len <= 64 {
            Some(64)
        } else {
            None
        }
    }

    /// The prefix immediately following `self` within a parent of length
    /// `parent_len`, wrapping back to the parent's first sub-prefix if the
    /// increment overflows the parent's address space. Returns the new
    /// prefix and whether it wrapped.
    pub fn increment(&self, parent_len: u8) -> (Prefix, bool) {
        debug_assert!(parent_len <= self.len);
        let step: u128 = if self.len >= 128 { 1 } else { 1u128 << (128 - self.len as u32) };
        let parent_base = mask(self.addr, parent_len);
        let next = self.addr.wrapping_add(step);
        let wrapped = mask(next, parent_len) != parent_base;
        let result_addr = if wrapped { parent_base } else { next };
        (
            Prefix {
                addr: result_addr,
                len: self.len,
            },
            wrapped,
        )
    }

    /// The prefix one past the end of `self`'s range at `self`'s own
    /// length, used to jump a random search cursor past an excluded range
    /// in a single step rather than iterating through it.
    pub fn last(&self) -> Prefix {
        self.increment(self.len).0
    }

    /// Draw a uniformly random sub-prefix of `target_len` within `self`.
    pub fn random_subprefix<R: Rng + ?Sized>(&self, target_len: u8, rng: &mut R) -> Prefix {
        debug_assert!(target_len >= self.len);
        let host_bits = target_len - self.len;
        let random: u128 = if host_bits == 0 {
            0
        } else if host_bits >= 128 {
            rng.random()
        } else {
            rng.random::<u128>() & ((1u128 << host_bits) - 1)
        };
        let shift = 128 - target_len as u32;
        Prefix {
            addr: self.addr | (random << shift.min(127)),
            len: target_len,
        }
    }
}

fn mask(addr: u128, len: u8) -> u128 {
    if len == 0 {
        0
    } else if len >= 128 {
        addr
    } else {
        addr & (u128::MAX << (128 - len as u32))
    }
}

/// Bounded random search for a free sub-prefix of `dp` at the assignment
/// length, skipping any sub-range inside `excluded` and any prefix that
/// collides per `collides`. Mirrors the original's rounds/wraparound caps:
/// at most `PREFIX_SEARCH_MAX_ROUNDS` draws, and the cursor is allowed to
/// wrap around the parent's address space at most once.
pub fn search_random_prefix<R: Rng + ?Sized>(
    dp: &Prefix,
    excluded: Option<&Prefix>,
    rng: &mut R,
    mut collides: impl FnMut(&Prefix) -> bool,
) -> Result<Prefix, crate::error::PaError> {
    let target_len = dp
        .assignment_len()
        .ok_or(crate::error::PaError::BadArgument("prefix has no defined assignment length"))?;

    if let Some(ex) = excluded {
        if ex.len <= dp.len && ex.contains(dp) {
            return Err(crate::error::PaError::ExcludedContainsDp);
        }
    }

    let host_bits = (target_len - dp.len) as u32;
    let rounds = if host_bits >= 32 {
        PREFIX_SEARCH_MAX_ROUNDS
    } else {
        (1u64 << host_bits).min(PREFIX_SEARCH_MAX_ROUNDS as u64) as u32
    };

    let mut candidate = dp.random_subprefix(target_len, rng);
    let mut looped = false;

    for _ in 0..rounds {
        if let Some(ex) = excluded {
            if candidate.overlaps(ex) {
                let jumped = ex.last();
                candidate = Prefix {
                    addr: mask(jumped.addr, target_len),
                    len: target_len,
                };
                continue;
            }
        }
        if !collides(&candidate) {
            return Ok(candidate);
        }
        let (next, wrapped) = candidate.increment(dp.len);
        if wrapped {
            if looped {
                break;
            }
            looped = true;
        }
        candidate = next;
    }

    Err(crate::error::PaError::SearchExhausted { rounds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    fn p(s: &str) -> Prefix {
        let net: Ipv6Net = s.parse().unwrap();
        Prefix::from_v6net(net)
    }

    #[test]
    fn contains_is_reflexive_and_respects_length() {
        let a = p("2001:db8::/32");
        let b = p("2001:db8:1::/48");
        assert!(a.contains(&a));
        assert!(a.contains(&b));
        assert!(!b.contains(&a));
    }

    #[test]
    fn ipv4_roundtrip_and_classification() {
        let v4 = Prefix::from_ipv4(Ipv4Addr::new(10, 0, 0, 0), 8);
        assert!(v4.is_ipv4());
        assert_eq!(v4.ipv4_len(), Some(8));
        assert_eq!(v4.assignment_len(), Some(96 + 24));
        assert!(!v4.is_ula());
    }

    #[test]
    fn ula_classification() {
        let ula = p("fd00::/8");
        assert!(ula.is_ula());
        assert!(!ula.is_global_v6());
        let global = p("2001:db8::/32");
        assert!(global.is_global_v6());
    }

    #[test]
    fn increment_wraps_within_parent() {
        let parent = p("2001:db8::/48");
        let mut cur = Prefix::new(Ipv6Addr::from(parent.addr), 64);
        let mut wrapped_once = false;
        for _ in 0..300 {
            let (next, wrapped) = cur.increment(48);
            if wrapped {
                wrapped_once = true;
                assert_eq!(next.addr, parent.addr);
                break;
            }
            cur = next;
        }
        assert!(wrapped_once, "a /64 walk under a /48 must wrap inside 65536 steps");
    }

    #[test]
    fn random_search_avoids_collisions() {
        let dp = p("2001:db8::/48");
        let mut rng = rand::rng();
        let taken = p("2001:db8:0:1::/64");
        let result = search_random_prefix(&dp, None, &mut rng, |cand| *cand == taken).unwrap();
        assert_ne!(result, taken);
        assert!(dp.contains(&result));
    }

    #[test]
    fn random_search_fails_when_excluded_covers_dp() {
        let dp = p("2001:db8::/48");
        let excluded = p("2001:db8::/40");
        let mut rng = rand::rng();
        let err = search_random_prefix(&dp, Some(&excluded), &mut rng, |_| false);
        assert!(matches!(err, Err(crate::error::PaError::ExcludedContainsDp)));
    }
}
