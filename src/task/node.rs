use std::fmt;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::serde_util::{aware_opt, one_or_many};
use crate::time::moment::now_local;
use crate::time::{Moment, Timestamp};

/// Unique identifier for tasks, templates, and schedules
pub type TaskId = Uuid;

/// Lifecycle state of a task.
///
/// `Done` and `Dropped` are terminal; there is no transition out of
/// either.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Placeholder,
    #[default]
    Todo,
    Done,
    Dropped,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Done | TaskState::Dropped)
    }

    /// Whether a node in this state may hold a child in `child`.
    ///
    /// Placeholders admit anything; todo tasks admit anything but
    /// placeholders; finished tasks admit only finished children.
    pub fn admits(self, child: TaskState) -> bool {
        match self {
            TaskState::Placeholder => true,
            TaskState::Todo => child != TaskState::Placeholder,
            TaskState::Done | TaskState::Dropped => child.is_terminal(),
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskState::Placeholder => "placeholder",
            TaskState::Todo => "todo",
            TaskState::Done => "done",
            TaskState::Dropped => "dropped",
        };
        f.write_str(name)
    }
}

/// A named tag with an urgency weight.
///
/// Wire form: a bare string when the weight is zero, otherwise
/// `{"name": …, "urgencyFactor": …}`. Both forms are accepted on input.
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub urgency_factor: f64,
}

impl Tag {
    pub fn named(name: impl Into<String>) -> Self {
        Tag {
            name: name.into(),
            urgency_factor: 0.0,
        }
    }

    pub fn weighted(name: impl Into<String>, urgency_factor: f64) -> Self {
        Tag {
            name: name.into(),
            urgency_factor,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct TagFields {
    name: String,
    #[serde(default)]
    urgency_factor: f64,
}

impl Serialize for Tag {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if self.urgency_factor == 0.0 {
            serializer.serialize_str(&self.name)
        } else {
            TagFields {
                name: self.name.clone(),
                urgency_factor: self.urgency_factor,
            }
            .serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Tag {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Wire {
            Name(String),
            Fields(TagFields),
        }

        Ok(match Wire::deserialize(deserializer)? {
            Wire::Name(name) => Tag::named(name),
            Wire::Fields(fields) => Tag::weighted(fields.name, fields.urgency_factor),
        })
    }
}

fn fresh_id() -> TaskId {
    Uuid::new_v4()
}

/// Nested construction and wire form of a task subtree.
///
/// Children are themselves `TaskSpec`s; building a [`crate::task::TaskList`]
/// flattens the nesting into the arena. Every list-shaped field accepts a
/// bare value or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskSpec {
    pub title: String,
    #[serde(default = "fresh_id")]
    pub uuid: TaskId,
    #[serde(default)]
    pub state: TaskState,
    #[serde(default, with = "aware_opt", skip_serializing_if = "Option::is_none")]
    pub created: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<Moment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<Moment>,
    #[serde(default, with = "aware_opt", skip_serializing_if = "Option::is_none")]
    pub ended: Option<Timestamp>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TaskSpec>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<TaskId>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<TaskId>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_urgency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_urgency_factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_urgency_max: Option<f64>,
}

impl TaskSpec {
    pub fn new(title: impl Into<String>) -> Self {
        TaskSpec {
            title: title.into(),
            uuid: fresh_id(),
            state: TaskState::default(),
            created: None,
            wait: None,
            due: None,
            ended: None,
            children: Vec::new(),
            requires: Vec::new(),
            blocks: Vec::new(),
            tags: Vec::new(),
            base_urgency: None,
            age_urgency_factor: None,
            age_urgency_max: None,
        }
    }
}

/// One node of the task forest.
///
/// Lives in the owning [`crate::task::TaskList`]'s arena; `parent` and
/// `children` are lookup links into that arena, never ownership. All
/// mutation goes through the list so the cross-tree invariants hold.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub(crate) uuid: TaskId,
    pub(crate) title: String,
    pub(crate) state: TaskState,
    pub(crate) created: Timestamp,
    pub(crate) wait: Option<Moment>,
    pub(crate) due: Option<Moment>,
    pub(crate) ended: Option<Timestamp>,
    pub(crate) parent: Option<TaskId>,
    pub(crate) children: Vec<TaskId>,
    pub(crate) requires: Vec<TaskId>,
    pub(crate) blocks: Vec<TaskId>,
    pub(crate) tags: Vec<String>,
    pub(crate) base_urgency: Option<f64>,
    pub(crate) age_urgency_factor: Option<f64>,
    pub(crate) age_urgency_max: Option<f64>,
}

impl Task {
    /// Splits a spec into the arena node and its child specs, applying
    /// the `ended` normalization: a non-terminal task carries no `ended`,
    /// a terminal one gets stamped now if the field was left unset.
    pub(crate) fn from_spec(spec: TaskSpec, parent: Option<TaskId>) -> (Task, Vec<TaskSpec>) {
        let ended = if spec.state.is_terminal() {
            Some(spec.ended.unwrap_or_else(now_local))
        } else {
            if spec.ended.is_some() {
                debug!("clearing ended on {} task {}", spec.state, spec.uuid);
            }
            None
        };
        let task = Task {
            uuid: spec.uuid,
            title: spec.title,
            state: spec.state,
            created: spec.created.unwrap_or_else(now_local),
            wait: spec.wait,
            due: spec.due,
            ended,
            parent,
            children: Vec::new(),
            requires: spec.requires,
            blocks: spec.blocks,
            tags: spec.tags,
            base_urgency: spec.base_urgency,
            age_urgency_factor: spec.age_urgency_factor,
            age_urgency_max: spec.age_urgency_max,
        };
        (task, spec.children)
    }

    pub fn uuid(&self) -> TaskId {
        self.uuid
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn created(&self) -> Timestamp {
        self.created
    }

    pub fn wait(&self) -> Option<Moment> {
        self.wait
    }

    pub fn due(&self) -> Option<Moment> {
        self.due
    }

    pub fn ended(&self) -> Option<Timestamp> {
        self.ended
    }

    /// The parent link, a lookup key into the owning list.
    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    /// Child ids in declaration order.
    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    /// Ids of tasks that must finish before this one.
    pub fn requires(&self) -> &[TaskId] {
        &self.requires
    }

    /// Ids of tasks this one holds up.
    pub fn blocks(&self) -> &[TaskId] {
        &self.blocks
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn base_urgency(&self) -> Option<f64> {
        self.base_urgency
    }

    pub fn age_urgency_factor(&self) -> Option<f64> {
        self.age_urgency_factor
    }

    pub fn age_urgency_max(&self) -> Option<f64> {
        self.age_urgency_max
    }
}
