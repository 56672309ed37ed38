pub mod scheduler;

pub use scheduler::{Scheduler, SchedulerError, TimerTask};
