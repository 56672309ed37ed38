//! Software timer table

use heapless::Vec;

use crate::os::is_due;

const MAX_TIMERS: usize = 4;

/// Work a timer expiry asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerTask {
    SampleGyro,
    RestartAdvertising,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// Every timer slot is in use
    Full,
}

#[derive(Clone, Copy)]
struct Timer {
    task: TimerTask,
    deadline: u32,
    period_ms: Option<u32>,
}

/// Fixed-capacity set of periodic and one-shot timers.
///
/// At most one timer per task; arming a task again replaces its timer.
pub struct Scheduler {
    timers: Vec<Timer, MAX_TIMERS>,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self { timers: Vec::new() }
    }

    /// Fire `task` every `period_ms`, first at `now + period_ms`
    pub fn schedule_periodic(
        &mut self,
        task: TimerTask,
        now: u32,
        period_ms: u32,
    ) -> Result<(), SchedulerError> {
        self.arm(Timer {
            task,
            deadline: now.wrapping_add(period_ms),
            period_ms: Some(period_ms.max(1)),
        })
    }

    /// Fire `task` once at `now + delay_ms`
    pub fn schedule_once(
        &mut self,
        task: TimerTask,
        now: u32,
        delay_ms: u32,
    ) -> Result<(), SchedulerError> {
        self.arm(Timer {
            task,
            deadline: now.wrapping_add(delay_ms),
            period_ms: None,
        })
    }

    fn arm(&mut self, timer: Timer) -> Result<(), SchedulerError> {
        self.cancel(timer.task);
        self.timers.push(timer).map_err(|_| SchedulerError::Full)
    }

    /// Disarm `task`; false if it was not armed
    pub fn cancel(&mut self, task: TimerTask) -> bool {
        match self.timers.iter().position(|t| t.task == task) {
            Some(index) => {
                self.timers.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, task: TimerTask) -> bool {
        self.timers.iter().any(|t| t.task == task)
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    /// Next expired task, if any.
    ///
    /// A periodic timer that fell several periods behind fires once and
    /// resumes one period after `now`.
    pub fn poll(&mut self, now: u32) -> Option<TimerTask> {
        let index = self.timers.iter().position(|t| is_due(now, t.deadline))?;
        let timer = &mut self.timers[index];
        let task = timer.task;

        match timer.period_ms {
            Some(period) => {
                let next = timer.deadline.wrapping_add(period);
                timer.deadline = if is_due(now, next) {
                    now.wrapping_add(period)
                } else {
                    next
                };
            }
            None => {
                self.timers.swap_remove(index);
            }
        }
        Some(task)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
