use std::panic::AssertUnwindSafe;

use indexmap::IndexMap;

use super::task_runner::run_task;
use super::{ExecutionContext, Schedule};
use crate::models::{Task, TaskOutcome, TaskReport};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SchedulerState {
    /// The next group to run has this order.
    Pending(i64),
    Done,
}

/// Runs a schedule one order group at a time.
///
/// Tasks sharing an order run concurrently, one thread each, and every one
/// of them finishes before the next order starts.
pub struct Scheduler {
    schedule: Schedule,
    context: ExecutionContext,
    state: SchedulerState,
    reports: Vec<TaskReport>,
}

impl Scheduler {
    pub fn new(schedule: Schedule, context: ExecutionContext) -> Self {
        let state = next_state(&schedule);
        Self {
            schedule,
            context,
            state,
            reports: Vec::new(),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn is_done(&self) -> bool {
        self.state == SchedulerState::Done
    }

    pub fn reports(&self) -> &[TaskReport] {
        &self.reports
    }

    /// Executes the next order group and returns its order, or `None` once
    /// every group has run.
    ///
    /// Blocks on the context's runtime handle, so it must not be called from
    /// within an async task.
    pub fn iterate(&mut self) -> Option<i64> {
        let SchedulerState::Pending(order) = self.state else {
            tracing::warn!("scheduler has no more tasks to run");
            return None;
        };

        let group = self.schedule.remove(&order).unwrap_or_default();
        self.state = next_state(&self.schedule);

        tracing::info!(order, tasks = group.len(), "running order group");
        let reports = run_group(&group, order, &self.context);
        self.reports.extend(reports);
        Some(order)
    }

    pub fn run_to_completion(&mut self) -> &[TaskReport] {
        while self.iterate().is_some() {}
        &self.reports
    }
}

fn next_state(schedule: &Schedule) -> SchedulerState {
    schedule
        .keys()
        .next()
        .map_or(SchedulerState::Done, |order| SchedulerState::Pending(*order))
}

fn run_group(group: &IndexMap<String, Task>, order: i64, context: &ExecutionContext) -> Vec<TaskReport> {
    if group.len() == 1 {
        return group
            .values()
            .map(|task| {
                std::panic::catch_unwind(AssertUnwindSafe(|| run_task(task, order, context)))
                    .unwrap_or_else(|_| panicked(task, order))
            })
            .collect();
    }

    std::thread::scope(|scope| {
        let handles: Vec<_> = group
            .values()
            .map(|task| (task, scope.spawn(move || run_task(task, order, context))))
            .collect();

        handles
            .into_iter()
            .map(|(task, handle)| handle.join().unwrap_or_else(|_| panicked(task, order)))
            .collect()
    })
}

fn panicked(task: &Task, order: i64) -> TaskReport {
    tracing::error!(task = %task.name, order, "task panicked");
    TaskReport {
        task: task.name.clone(),
        order,
        outcome: TaskOutcome::Panicked,
        steps: Vec::new(),
    }
}
