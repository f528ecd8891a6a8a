pub mod boundary_scheduler;
pub(crate) mod ordering;
pub mod tests;
pub mod unit;

pub use boundary_scheduler::{BoundaryScheduler, SchedulerStats};
pub use unit::{BoundaryId, BoundaryUnit, UnitStatus};
