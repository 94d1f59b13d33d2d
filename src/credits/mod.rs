/// Credit accounting: the anonymous pool, the per-account ledger, the
/// one-time signup bonus, and tier resolution.
///
/// These constants are part of the observable contract of the service;
/// clients display them and the denial responses depend on them.

pub mod anonymous;
pub mod bonus;
pub mod ledger;
pub mod tier;

pub use anonymous::{AnonymousCreditPool, AnonymousPoolConfig};
pub use bonus::SignupBonusGranter;
pub use ledger::{CreditInfo, CreditLedger, Deduction, DeductionSource};
pub use tier::TierResolver;

/// Credits granted to an unauthenticated caller on first sight
pub const ANONYMOUS_ALLOWANCE: i64 = 5;

/// Free credits replenished per 24-hour window for registered accounts
pub const DAILY_ALLOWANCE: i64 = 3;

/// One-time bonus credited when an account is first seen
pub const SIGNUP_BONUS: i64 = 10;
