pub mod repair;

pub use repair::{repair_results, RepairOptions, RepairReport};
