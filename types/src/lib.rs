pub mod state;
pub use state::{baseline_state, credit_coins, merge_with_baseline, Document};

/// Coins granted to both referrer and friend when a referral is first
/// registered.
pub const REFERRAL_BONUS: u64 = 10_000;

/// Result of a referral registration attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferralOutcome {
    /// The friend already has a referral record; nothing was changed.
    AlreadyRegistered,
    /// The referral was recorded and both parties were credited the bonus.
    Registered { bonus: u64 },
}
