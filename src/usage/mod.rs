pub mod meter;
pub mod types;

pub use meter::UsageMeter;
pub use types::{UsageRecord, UsageStatus, first_instant_of_next_month};
