pub mod membership;
pub mod providers;

pub use membership::{CacheState, MembershipCache, DEFAULT_MEMBERSHIP_TTL};
