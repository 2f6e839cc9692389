use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::recur::{OccurrenceQuery, Occurrences, RecurrenceRule, RuleSet};
use crate::serde_util::one_or_many;
use crate::task::node::TaskId;
use crate::time::{CalendarDelta, TemplateMoment, Timestamp};

fn fresh_id() -> TaskId {
    Uuid::new_v4()
}

/// Nested construction and wire form of a template subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TemplateSpec {
    pub title: String,
    #[serde(default = "fresh_id")]
    pub uuid: TaskId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<TemplateMoment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due: Option<TemplateMoment>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TemplateSpec>,
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

impl TemplateSpec {
    pub fn new(title: impl Into<String>) -> Self {
        TemplateSpec {
            title: title.into(),
            uuid: fresh_id(),
            wait: None,
            due: None,
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

/// A not-yet-instantiated recurring task.
///
/// Mirrors a [`crate::task::Task`] minus the lifecycle fields; `wait` and
/// `due` may be offsets resolved when an instance is eventually
/// materialized. Every template carries a back-link to the schedule that
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskTemplate {
    pub(crate) uuid: TaskId,
    pub(crate) title: String,
    pub(crate) wait: Option<TemplateMoment>,
    pub(crate) due: Option<TemplateMoment>,
    pub(crate) parent: Option<TaskId>,
    pub(crate) children: Vec<TaskId>,
    pub(crate) requires: Vec<TaskId>,
    pub(crate) blocks: Vec<TaskId>,
    pub(crate) tags: Vec<String>,
    pub(crate) base_urgency: Option<f64>,
    pub(crate) age_urgency_factor: Option<f64>,
    pub(crate) age_urgency_max: Option<f64>,
    pub(crate) schedule: TaskId,
}

impl TaskTemplate {
    pub(crate) fn from_spec(
        spec: TemplateSpec,
        parent: Option<TaskId>,
        schedule: TaskId,
    ) -> (TaskTemplate, Vec<TemplateSpec>) {
        let template = TaskTemplate {
            uuid: spec.uuid,
            title: spec.title,
            wait: spec.wait,
            due: spec.due,
            parent,
            children: Vec::new(),
            requires: spec.requires,
            blocks: spec.blocks,
            tags: spec.tags,
            base_urgency: spec.base_urgency,
            age_urgency_factor: spec.age_urgency_factor,
            age_urgency_max: spec.age_urgency_max,
            schedule,
        };
        (template, spec.children)
    }

    pub fn uuid(&self) -> TaskId {
        self.uuid
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn wait(&self) -> Option<TemplateMoment> {
        self.wait
    }

    pub fn due(&self) -> Option<TemplateMoment> {
        self.due
    }

    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    pub fn requires(&self) -> &[TaskId] {
        &self.requires
    }

    pub fn blocks(&self) -> &[TaskId] {
        &self.blocks
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Id of the owning [`TaskSchedule`].
    pub fn schedule(&self) -> TaskId {
        self.schedule
    }
}

/// The three kinds of recurrence source a schedule can carry.
///
/// The wire form is untagged: a rule map has a `freq` field, a set map
/// has only its rule/date lists, and a duration is a text or field form
/// neither of the other two accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleSource {
    Rule(RecurrenceRule),
    Set(RuleSet),
    Every(CalendarDelta),
}

impl ScheduleSource {
    /// A query view of this source starting at `anchor`.
    ///
    /// A duration source generates `anchor`, `anchor + d`, `anchor + 2d`,
    /// … unbounded; rules and sets carry their own start and ignore the
    /// anchor.
    pub fn anchored(&self, anchor: Timestamp) -> AnchoredSchedule<'_> {
        AnchoredSchedule {
            source: self,
            anchor,
        }
    }
}

/// [`OccurrenceQuery`] view of a [`ScheduleSource`] tied to an anchor
/// instant
#[derive(Debug, Clone, Copy)]
pub struct AnchoredSchedule<'a> {
    source: &'a ScheduleSource,
    anchor: Timestamp,
}

/// Repeats a calendar offset from an anchor. Stops if the offset ever
/// fails to move the clock forward, so a zero or unrepresentable delta
/// cannot loop on one instant.
struct EveryOccurrences<'a> {
    delta: &'a CalendarDelta,
    next: Option<Timestamp>,
}

impl Iterator for EveryOccurrences<'_> {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Timestamp> {
        let current = self.next?;
        self.next = match self.delta.shift(current) {
            Ok(following) if following > current => Some(following),
            _ => None,
        };
        Some(current)
    }
}

impl OccurrenceQuery for AnchoredSchedule<'_> {
    fn occurrences(&self) -> Occurrences<'_> {
        match self.source {
            ScheduleSource::Rule(rule) => rule.occurrences(),
            ScheduleSource::Set(set) => set.occurrences(),
            ScheduleSource::Every(delta) => Box::new(EveryOccurrences {
                delta,
                next: Some(self.anchor),
            }),
        }
    }

    fn is_bounded(&self) -> bool {
        match self.source {
            ScheduleSource::Rule(rule) => rule.is_bounded(),
            ScheduleSource::Set(set) => set.is_bounded(),
            ScheduleSource::Every(_) => false,
        }
    }
}

/// Wire form of a schedule: one recurrence source plus the root
/// templates it instantiates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ScheduleSpec {
    #[serde(default = "fresh_id")]
    pub uuid: TaskId,
    pub schedule: ScheduleSource,
    #[serde(with = "one_or_many")]
    pub tasks: Vec<TemplateSpec>,
}

/// One recurrence source bound to a forest of task templates.
///
/// Templates live in the owning list's template arena; the schedule
/// keeps the root ids in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSchedule {
    pub(crate) uuid: TaskId,
    pub(crate) schedule: ScheduleSource,
    pub(crate) roots: Vec<TaskId>,
}

impl TaskSchedule {
    pub fn uuid(&self) -> TaskId {
        self.uuid
    }

    pub fn source(&self) -> &ScheduleSource {
        &self.schedule
    }

    /// Root template ids in declaration order.
    pub fn template_roots(&self) -> &[TaskId] {
        &self.roots
    }

    pub fn anchored(&self, anchor: Timestamp) -> AnchoredSchedule<'_> {
        self.schedule.anchored(anchor)
    }
}
