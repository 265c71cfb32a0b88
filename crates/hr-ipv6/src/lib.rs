pub mod config;
pub mod ra;
pub mod dhcpv6;
pub mod pd_client;

pub use config::Ipv6Config;
pub use pd_client::{PrefixInfo, PrefixSender, PrefixWatch};
