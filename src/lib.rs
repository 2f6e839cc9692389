//! # taskforest
//!
//! An in-process model of hierarchical tasks with dependency tracking,
//! urgency scoring, and a calendar recurrence engine, for a personal
//! task tracker.
//!
//! ## Architecture Overview
//!
//! The crate is organized into three layers, leaves first:
//!
//! - **[`time`]**: the timezone-aware [`time::Timestamp`] representation,
//!   calendar-aware offsets ([`time::CalendarDelta`]), weekday ordinals,
//!   and time periods
//! - **[`recur`]**: the occurrence generator — single frequency-driven
//!   rules ([`recur::RecurrenceRule`]), inclusion/exclusion composition
//!   ([`recur::RuleSet`]), and the shared [`recur::OccurrenceQuery`]
//!   query surface
//! - **[`task`]**: the task forest — lifecycle state machine, inherited
//!   urgency parameters, dependency graph, and recurrence schedules
//!   bound to task templates, all owned by a [`task::TaskList`]
//!
//! Everything is synchronous and free of I/O; the [`task::TaskList`] is
//! built or mutated by a single writer and read freely afterwards.
//!
//! ## Quick Start
//!
//! ```
//! use taskforest::task::{TaskList, TaskListSpec, TaskSpec};
//! use taskforest::time::parse_timestamp;
//!
//! fn main() -> Result<(), taskforest::ModelError> {
//!     let mut list = TaskList::new(TaskListSpec {
//!         tasks: vec![TaskSpec::new("water the plants")],
//!         ..TaskListSpec::default()
//!     })?;
//!
//!     let id = list.roots()[0];
//!     let now = parse_timestamp("2024-06-01T09:00:00+02:00")?;
//!     println!("urgency: {:.2}", list.urgency(id, now)?);
//!     list.mark_done(id)?;
//!     Ok(())
//! }
//! ```

/// Date, time, and calendar-offset foundation.
///
/// Defines the single timezone-aware instant type of the model, the
/// naive-input normalization applied once at ingestion, and the
/// calendar-aware duration descriptor.
pub mod time;

/// Calendar recurrence engine.
///
/// Frequency-driven occurrence generation with field filters, rule-set
/// composition via inclusion and exclusion, and lazy point/range
/// queries over the resulting timelines.
pub mod recur;

/// Task forest, lifecycle, and dependency graph.
///
/// The arena-backed task tree with its state machine, inherited urgency
/// parameters, reconciled dependency queries, and the schedules binding
/// recurrence sources to task templates.
pub mod task;

/// Typed errors for construction, invariant, conversion, and lookup
/// failures.
pub mod error;

/// Shared (de)serialization helpers for the compact wire forms.
pub mod serde_util;

pub use error::{ModelError, Result};

pub use time::{CalendarDelta, CalendarDeltaSpec, Moment, Timestamp, Weekday, WeekdayOffset};

pub use recur::{Frequency, OccurrenceQuery, RecurrenceRule, RuleSet, RuleSpec};

pub use task::{
    ScheduleSource, Tag, Task, TaskList, TaskListSpec, TaskSchedule, TaskSpec, TaskState,
    TaskTemplate,
};
