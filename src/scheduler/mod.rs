//! Scheduled task model and next-run computation.

pub mod schedule;
pub mod task;

pub use schedule::ScheduleCalculator;
pub use task::{ContextMode, ScheduleType, Task, TaskStatus, new_task_id};
