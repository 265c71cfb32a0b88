use serde::{Deserialize, Serialize};

/// Which peer picks up ownership of a contested prefix.
///
/// Arkko never claims a prefix a peer is already advertising; Pfister claims
/// it when we hold the highest router-id on the link and the link is
/// designated to us. Selected at construction time, not compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaaVariant {
    Arkko,
    Pfister,
}

impl Default for PaaVariant {
    fn default() -> Self {
        PaaVariant::Pfister
    }
}

fn default_flooding_delay_s() -> u64 {
    15
}

fn default_local_valid_s() -> u64 {
    600
}

fn default_local_preferred_s() -> u64 {
    300
}

fn default_local_update_delay_s() -> u64 {
    330
}

fn default_random_ula_plen() -> u8 {
    48
}

fn default_true() -> bool {
    true
}

fn default_v4_prefix() -> String {
    "10.0.0.0/8".to_string()
}

/// Runtime configuration for the prefix-assignment engine, loaded the way
/// every other `hr-*` service loads its config: a `serde`-deserializable
/// struct with per-field defaults, so a partial or empty document still
/// produces a usable `PaConf`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaConf {
    pub variant: PaaVariant,

    #[serde(rename = "flooding_delay_seconds")]
    #[serde(default = "default_flooding_delay_s")]
    pub flooding_delay_s: u64,

    #[serde(default = "default_true")]
    pub use_ula: bool,
    #[serde(default = "default_true")]
    pub no_ula_if_glb_ipv6: bool,
    #[serde(default = "default_true")]
    pub use_random_ula: bool,
    #[serde(default = "default_random_ula_plen")]
    pub random_ula_plen: u8,
    /// Fixed ULA prefix to use when `use_random_ula` is false. Must be set
    /// in that case; validated in `Paa::new`.
    pub fixed_ula_prefix: Option<String>,

    #[serde(default = "default_true")]
    pub use_ipv4: bool,
    #[serde(default)]
    pub no_ipv4_if_glb_ipv6: bool,
    #[serde(default = "default_v4_prefix")]
    pub v4_prefix: String,

    #[serde(default = "default_local_valid_s")]
    pub local_valid_s: u64,
    #[serde(default = "default_local_preferred_s")]
    pub local_preferred_s: u64,
    #[serde(default = "default_local_update_delay_s")]
    pub local_update_delay_s: u64,
}

impl Default for PaConf {
    fn default() -> Self {
        serde_json::from_str("{}").expect("empty document deserializes with all defaults")
    }
}

impl PaConf {
    pub fn flooding_delay(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.flooding_delay_s as i64)
    }

    /// The delayed-action and local-prefix creation delay: `2 * flooding_delay`.
    pub fn assign_delay(&self) -> chrono::Duration {
        self.flooding_delay() * 2
    }

    pub fn validate(&self) -> Result<(), crate::error::PaError> {
        if !self.use_random_ula && self.fixed_ula_prefix.is_none() {
            return Err(crate::error::PaError::BadArgument(
                "fixed_ula_prefix must be set when use_random_ula is false",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_empty_document() {
        let conf = PaConf::default();
        assert_eq!(conf.flooding_delay_s, 15);
        assert!(conf.use_ula);
        assert!(conf.use_ipv4);
        assert_eq!(conf.random_ula_plen, 48);
        assert_eq!(conf.variant, PaaVariant::Pfister);
    }

    #[test]
    fn rejects_fixed_ula_without_prefix() {
        let mut conf = PaConf {
            use_random_ula: false,
            ..Default::default()
        };
        assert!(conf.validate().is_err());
        conf.fixed_ula_prefix = Some("fd00::/48".to_string());
        assert!(conf.validate().is_ok());
    }
}
