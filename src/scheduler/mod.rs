//! Priority-based periodic task scheduler.
//!
//! Fixed-capacity task table driven by two periodic tick sources: a
//! control-rate source for the High/Normal/Low classes and a faster safety
//! source for the Critical class. Within one tick, due tasks of a class run
//! to completion in registration order; the scheduler never blocks and
//! never sleeps — time comes from the [`Clock`] collaborator at tick entry.
//!
//! Deadline misses, execution maxima, jitter, and overruns are accumulated
//! O(1) per cycle with no allocation.

use core::sync::atomic::{AtomicBool, Ordering};

use heapless::Vec;

use crate::error::SchedulerError;
use crate::hal::Clock;

/// Single-producer/single-consumer tick notification.
///
/// A periodic interrupt handler calls [`signal`](Self::signal); the dispatch
/// loop calls [`take`](Self::take) and runs the matching tick entry point
/// when it returns `true`. Signals arriving while one is already pending
/// coalesce, so at most one tick is ever outstanding and the consumer is
/// woken exactly once per pending signal.
#[derive(Debug, Default)]
pub struct TickNotifier {
    pending: AtomicBool,
}

impl TickNotifier {
    /// Create a notifier with no pending signal.
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Post a tick. Safe to call from interrupt context.
    #[inline]
    pub fn signal(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Consume the pending tick, if any.
    #[inline]
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Whether a tick is pending, without consuming it.
    #[inline]
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}

/// Task priority class, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    /// Safety monitoring; driven by the fast tick source.
    Critical,
    /// Position control.
    High,
    /// Coordination and profile bookkeeping.
    Normal,
    /// Background work.
    Low,
}

/// Lifecycle state of a task slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskState {
    /// Waiting for its period to elapse.
    Idle,
    /// Due this tick.
    Ready,
    /// Executing now.
    Running,
    /// Disabled; not scheduled.
    Blocked,
}

/// Handle to a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskId(u8);

impl TaskId {
    /// Raw table index.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Registration parameters for one periodic task.
#[derive(Debug, Clone)]
pub struct TaskConfig<K> {
    /// Display name.
    pub name: &'static str,
    /// Dispatch value handed back on execution.
    pub kind: K,
    /// Priority class.
    pub priority: Priority,
    /// Execution period in microseconds.
    pub period_us: u32,
    /// Deadline in microseconds; elapsed time beyond this counts a miss.
    pub deadline_us: u32,
    /// Start enabled.
    pub enabled: bool,
}

/// Per-task timing statistics.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TaskStats {
    /// Completed executions.
    pub executions: u32,
    /// Deadline misses (first run ignored).
    pub missed_deadlines: u32,
    /// Duration of the last execution, microseconds.
    pub last_exec_us: u32,
    /// Longest execution observed, microseconds.
    pub max_exec_us: u32,
    /// Largest |difference| between consecutive inter-call intervals.
    pub max_jitter_us: u32,
}

/// Scheduler-level statistics snapshot.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SchedulerStats {
    /// Critical/High cycles whose execution time exceeded the source period.
    pub overruns: u32,
    /// Sum of all tasks' missed deadlines.
    pub total_missed_deadlines: u32,
}

struct TaskSlot<K> {
    config: TaskConfig<K>,
    state: TaskState,
    last_start_us: Option<u64>,
    last_interval_us: Option<u64>,
    stats: TaskStats,
}

/// Fixed-table periodic scheduler generic over a `Copy` task-kind value.
pub struct Scheduler<K: Copy, const N: usize> {
    tasks: Vec<TaskSlot<K>, N>,
    control_period_us: u32,
    safety_period_us: u32,
    overruns: u32,
}

impl<K: Copy, const N: usize> Scheduler<K, N> {
    /// Create a scheduler with the two tick-source periods.
    pub fn new(control_period_us: u32, safety_period_us: u32) -> Self {
        Self {
            tasks: Vec::new(),
            control_period_us,
            safety_period_us,
            overruns: 0,
        }
    }

    /// Register a periodic task.
    ///
    /// # Errors
    ///
    /// `NoFreeSlots` when the fixed-size table is full.
    pub fn create_task(&mut self, config: TaskConfig<K>) -> Result<TaskId, SchedulerError> {
        let id = TaskId(self.tasks.len() as u8);
        let state = if config.enabled {
            TaskState::Idle
        } else {
            TaskState::Blocked
        };
        self.tasks
            .push(TaskSlot {
                config,
                state,
                last_start_us: None,
                last_interval_us: None,
                stats: TaskStats::default(),
            })
            .map_err(|_| SchedulerError::NoFreeSlots)?;
        Ok(id)
    }

    /// Enable or disable a task. Tasks are never deallocated.
    ///
    /// # Errors
    ///
    /// `InvalidTask` for an unknown id.
    pub fn enable_task(&mut self, id: TaskId, enabled: bool) -> Result<(), SchedulerError> {
        let slot = self
            .tasks
            .get_mut(id.index())
            .ok_or(SchedulerError::InvalidTask(id.0))?;
        slot.config.enabled = enabled;
        slot.state = if enabled {
            TaskState::Idle
        } else {
            TaskState::Blocked
        };
        Ok(())
    }

    /// Per-task statistics.
    ///
    /// # Errors
    ///
    /// `InvalidTask` for an unknown id.
    pub fn task_stats(&self, id: TaskId) -> Result<TaskStats, SchedulerError> {
        self.tasks
            .get(id.index())
            .map(|slot| slot.stats)
            .ok_or(SchedulerError::InvalidTask(id.0))
    }

    /// Scheduler-level statistics.
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            overruns: self.overruns,
            total_missed_deadlines: self
                .tasks
                .iter()
                .map(|slot| slot.stats.missed_deadlines)
                .sum(),
        }
    }

    /// Whether the timing statistics are below the given fault thresholds.
    pub fn is_healthy(&self, max_missed_deadlines: u32, max_overruns: u32) -> bool {
        let stats = self.stats();
        stats.total_missed_deadlines <= max_missed_deadlines && stats.overruns <= max_overruns
    }

    /// Run the Critical class (safety tick source).
    ///
    /// `execute` receives each due task's kind, the elapsed seconds since
    /// its previous run, and the dispatch timestamp in microseconds.
    pub fn tick_safety<C, F>(&mut self, clock: &mut C, execute: F)
    where
        C: Clock,
        F: FnMut(K, f32, u64),
    {
        let source_period = self.safety_period_us;
        let spent = self.run_class(Priority::Critical, clock, execute);
        if spent > source_period as u64 {
            self.overruns = self.overruns.saturating_add(1);
        }
    }

    /// Run the High, Normal, and Low classes in that order (control tick
    /// source).
    pub fn tick_control<C, F>(&mut self, clock: &mut C, mut execute: F)
    where
        C: Clock,
        F: FnMut(K, f32, u64),
    {
        let source_period = self.control_period_us;
        let spent = self.run_class(Priority::High, clock, &mut execute);
        if spent > source_period as u64 {
            self.overruns = self.overruns.saturating_add(1);
        }
        self.run_class(Priority::Normal, clock, &mut execute);
        self.run_class(Priority::Low, clock, &mut execute);
    }

    /// Run every due task of one class in registration order.
    ///
    /// Returns the summed execution time in microseconds.
    fn run_class<C, F>(&mut self, class: Priority, clock: &mut C, mut execute: F) -> u64
    where
        C: Clock,
        F: FnMut(K, f32, u64),
    {
        let mut spent_us: u64 = 0;

        for slot in self.tasks.iter_mut() {
            if slot.config.priority != class || !slot.config.enabled {
                continue;
            }

            let now = clock.now_us();
            let elapsed = match slot.last_start_us {
                Some(last) => now.saturating_sub(last),
                None => slot.config.period_us as u64,
            };
            if elapsed < slot.config.period_us as u64 {
                continue;
            }
            slot.state = TaskState::Ready;

            // Deadline and jitter are judged on the inter-call interval;
            // both need a previous run to compare against.
            if let Some(_last) = slot.last_start_us {
                if elapsed > slot.config.deadline_us as u64 {
                    slot.stats.missed_deadlines = slot.stats.missed_deadlines.saturating_add(1);
                }
                if let Some(prev_interval) = slot.last_interval_us {
                    let jitter = elapsed.abs_diff(prev_interval);
                    if jitter > slot.stats.max_jitter_us as u64 {
                        slot.stats.max_jitter_us = jitter.min(u32::MAX as u64) as u32;
                    }
                }
                slot.last_interval_us = Some(elapsed);
            }
            slot.last_start_us = Some(now);

            let dt = elapsed as f32 / 1_000_000.0;
            slot.state = TaskState::Running;
            execute(slot.config.kind, dt, now);
            let duration = clock.now_us().saturating_sub(now);
            slot.state = TaskState::Idle;

            slot.stats.executions = slot.stats.executions.saturating_add(1);
            slot.stats.last_exec_us = duration.min(u32::MAX as u64) as u32;
            if slot.stats.last_exec_us > slot.stats.max_exec_us {
                slot.stats.max_exec_us = slot.stats.last_exec_us;
            }
            spent_us += duration;
        }

        spent_us
    }
}
