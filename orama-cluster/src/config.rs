//! Cluster-membership configuration and timing constants (§4.2).

use orama_core::AdvertiseMode;
use std::time::Duration;

/// Membership record publish interval.
pub const MEMBERSHIP_TICK: Duration = Duration::from_secs(10);
/// A member is dropped from the table after this many missed ticks.
pub const MISSED_INTERVALS_BEFORE_EXPIRY: u32 = 3;
/// `MEMBERSHIP_TICK * MISSED_INTERVALS_BEFORE_EXPIRY`.
pub const MEMBER_EXPIRY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Explicit join address override; skips the decision function (§4.2 step 1).
    pub explicit_join_addr: Option<String>,
    pub is_bootstrap: bool,
    pub advertise_mode: AdvertiseMode,
    pub raft_port: u16,
    pub sql_http_port: u16,
}
