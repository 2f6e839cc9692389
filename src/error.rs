use uuid::Uuid;

use crate::task::TaskState;

/// Errors produced while constructing, validating, or querying the model
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelError {
    // Construction: malformed input values
    #[error("Invalid duration text: {0:?}")]
    DurationParse(String),
    #[error("Invalid weekday: {0:?}")]
    WeekdayParse(String),
    #[error("Invalid frequency: {0:?}")]
    FrequencyParse(String),
    #[error("Invalid timestamp: {0:?}")]
    TimestampParse(String),
    #[error("Invalid date or timestamp: {0:?}")]
    MomentParse(String),
    #[error("{field} out of range: {value}")]
    OutOfRange { field: &'static str, value: i64 },
    #[error("{field} must not be zero")]
    ForbiddenZero { field: &'static str },
    #[error("Weekday offset map must have exactly one entry, got {len}")]
    WeekdayMapEntries { len: usize },

    // Invariant: structurally valid values that contradict the model rules
    #[error("A rule cannot set both count and until")]
    CountAndUntil,
    #[error("Interval and {field} can never align on any value")]
    UnsatisfiableRule { field: &'static str },
    #[error("Period start {start} is after its end {end}")]
    PeriodOrder { start: String, end: String },
    #[error("Task {parent} in state {parent_state:?} cannot have child {child} in state {child_state:?}")]
    ChildState {
        parent: Uuid,
        child: Uuid,
        parent_state: TaskState,
        child_state: TaskState,
    },
    #[error("Task {0} still has unfinished children")]
    OpenChildren(Uuid),
    #[error("Task {0} is already finished")]
    AlreadyEnded(Uuid),
    #[error("Tag {0:?} is not declared on the task list")]
    UndeclaredTag(String),
    #[error("Duplicate id {0} in the forest")]
    DuplicateId(Uuid),
    #[error("Dependency cycle through task {0}")]
    DependencyCycle(Uuid),

    // Conversion: values that cannot be represented in the requested form
    #[error("Duration with {field} set has no text form")]
    UnrenderableDelta { field: &'static str },
    #[error("Duration with {field} set has no fixed length")]
    InexactDelta { field: &'static str },
    #[error("Duration with {field} set cannot shift a plain date")]
    DateOnlyDelta { field: &'static str },
    #[error("Shifted date or time falls outside the representable range")]
    ShiftOverflow,

    // Lookup: identifiers that resolve to nothing
    #[error("No task with id {0}")]
    UnknownTask(Uuid),
    #[error("No template with id {0}")]
    UnknownTemplate(Uuid),
    #[error("No schedule with id {0}")]
    UnknownSchedule(Uuid),
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
