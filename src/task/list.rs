use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ModelError, Result};
use crate::serde_util::one_or_many;
use crate::task::node::{Tag, Task, TaskId, TaskSpec, TaskState};
use crate::task::schedule::{ScheduleSpec, TaskSchedule, TaskTemplate, TemplateSpec};
use crate::time::Timestamp;
use crate::time::moment::now_local;

fn default_age_urgency_factor() -> f64 {
    4.0 / 365.0
}

fn default_age_urgency_max() -> f64 {
    4.0
}

/// Wire form of a whole task list: nested task trees, schedules, and the
/// tag vocabulary, plus the list-level urgency defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TaskListSpec {
    #[serde(default)]
    pub base_urgency: f64,
    #[serde(default = "default_age_urgency_factor")]
    pub age_urgency_factor: f64,
    #[serde(default = "default_age_urgency_max")]
    pub age_urgency_max: f64,
    #[serde(default, with = "one_or_many")]
    pub tasks: Vec<TaskSpec>,
    #[serde(default, with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub recurring_tasks: Vec<ScheduleSpec>,
    #[serde(default, with = "one_or_many")]
    pub tags: Vec<Tag>,
}

impl Default for TaskListSpec {
    fn default() -> Self {
        TaskListSpec {
            base_urgency: 0.0,
            age_urgency_factor: default_age_urgency_factor(),
            age_urgency_max: default_age_urgency_max(),
            tasks: Vec::new(),
            recurring_tasks: Vec::new(),
            tags: Vec::new(),
        }
    }
}

/// Owner of the task forest, the recurrence schedules, and the tag
/// vocabulary.
///
/// Tasks and templates live in flat arenas keyed by UUID; tree structure
/// is expressed through id links and the root lists. Every structural
/// mutation runs a wholesale validation pass over the forest and leaves
/// the list untouched on rejection. A built list is safe for concurrent
/// readers; mutation needs external single-writer discipline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskListSpec", into = "TaskListSpec")]
pub struct TaskList {
    base_urgency: f64,
    age_urgency_factor: f64,
    age_urgency_max: f64,
    tasks: HashMap<TaskId, Task>,
    roots: Vec<TaskId>,
    templates: HashMap<TaskId, TaskTemplate>,
    schedules: HashMap<TaskId, TaskSchedule>,
    schedule_order: Vec<TaskId>,
    tags: HashMap<String, Tag>,
    tag_order: Vec<String>,
}

impl TaskList {
    pub fn new(spec: TaskListSpec) -> Result<Self> {
        Self::try_from(spec)
    }

    /// An empty list with the default urgency parameters.
    pub fn empty() -> Self {
        TaskList {
            base_urgency: 0.0,
            age_urgency_factor: default_age_urgency_factor(),
            age_urgency_max: default_age_urgency_max(),
            tasks: HashMap::new(),
            roots: Vec::new(),
            templates: HashMap::new(),
            schedules: HashMap::new(),
            schedule_order: Vec::new(),
            tags: HashMap::new(),
            tag_order: Vec::new(),
        }
    }

    // ---- lookups ----------------------------------------------------

    pub fn task(&self, id: TaskId) -> Result<&Task> {
        self.tasks.get(&id).ok_or(ModelError::UnknownTask(id))
    }

    pub fn template(&self, id: TaskId) -> Result<&TaskTemplate> {
        self.templates
            .get(&id)
            .ok_or(ModelError::UnknownTemplate(id))
    }

    pub fn schedule(&self, id: TaskId) -> Result<&TaskSchedule> {
        self.schedules
            .get(&id)
            .ok_or(ModelError::UnknownSchedule(id))
    }

    /// The schedule a template belongs to, through its back-link.
    pub fn schedule_of_template(&self, id: TaskId) -> Result<&TaskSchedule> {
        let template = self.template(id)?;
        self.schedule(template.schedule)
    }

    pub fn tag(&self, name: &str) -> Option<&Tag> {
        self.tags.get(name)
    }

    /// Root task ids in declaration order.
    pub fn roots(&self) -> &[TaskId] {
        &self.roots
    }

    /// Every task in the forest, in arbitrary order.
    pub fn all_tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn all_templates(&self) -> impl Iterator<Item = &TaskTemplate> {
        self.templates.values()
    }

    /// Schedules in declaration order.
    pub fn all_schedules(&self) -> impl Iterator<Item = &TaskSchedule> {
        self.schedule_order
            .iter()
            .filter_map(|id| self.schedules.get(id))
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    // ---- structural mutation ----------------------------------------

    /// Inserts a task subtree under `parent` (or as a new root) and
    /// revalidates the forest. The list is unchanged when any check
    /// fails.
    pub fn add_task(&mut self, spec: TaskSpec, parent: Option<TaskId>) -> Result<TaskId> {
        if let Some(parent_id) = parent {
            self.task(parent_id)?;
        }
        let mut staged = self.clone();
        let id = staged.insert_tree(spec, parent)?;
        match parent {
            Some(parent_id) => {
                if let Some(task) = staged.tasks.get_mut(&parent_id) {
                    task.children.push(id);
                }
            }
            None => staged.roots.push(id),
        }
        staged.rebuild()?;
        debug!("added task {} under {:?}", id, parent);
        *self = staged;
        Ok(id)
    }

    /// Detaches a subtree from its parent's child list (or the roots)
    /// and drops every node in it from the arena. The detached ids stop
    /// resolving; dependency edges that pointed into the subtree now
    /// only produce validation warnings and lookup misses.
    pub fn detach(&mut self, id: TaskId) -> Result<()> {
        let parent = self.task(id)?.parent;
        let mut staged = self.clone();
        match parent {
            Some(parent_id) => {
                if let Some(task) = staged.tasks.get_mut(&parent_id) {
                    task.children.retain(|child| *child != id);
                }
            }
            None => staged.roots.retain(|root| *root != id),
        }
        let mut stack = vec![id];
        let mut removed = 0usize;
        while let Some(next) = stack.pop() {
            if let Some(task) = staged.tasks.remove(&next) {
                stack.extend(task.children);
                removed += 1;
            }
        }
        staged.rebuild()?;
        debug!("detached task {} ({} nodes)", id, removed);
        *self = staged;
        Ok(())
    }

    /// Declares a tag, replacing any earlier declaration of the same
    /// name, and revalidates nothing: adding vocabulary cannot break the
    /// forest.
    pub fn declare_tag(&mut self, tag: Tag) {
        if !self.tags.contains_key(&tag.name) {
            self.tag_order.push(tag.name.clone());
        }
        self.tags.insert(tag.name.clone(), tag);
    }

    // ---- lifecycle ---------------------------------------------------

    /// Terminal transition into `done`. Fails for unknown ids, already
    /// finished tasks, and tasks with unfinished children; stamps
    /// `ended` with the current time.
    pub fn mark_done(&mut self, id: TaskId) -> Result<()> {
        self.finish(id, TaskState::Done)
    }

    /// Terminal transition into `dropped`, same preconditions as
    /// [`mark_done`](Self::mark_done).
    pub fn mark_drop(&mut self, id: TaskId) -> Result<()> {
        self.finish(id, TaskState::Dropped)
    }

    fn finish(&mut self, id: TaskId, state: TaskState) -> Result<()> {
        let task = self.task(id)?;
        if task.state.is_terminal() {
            return Err(ModelError::AlreadyEnded(id));
        }
        let open_child = task.children.iter().any(|child| {
            self.tasks
                .get(child)
                .is_some_and(|c| !c.state.is_terminal())
        });
        if open_child {
            return Err(ModelError::OpenChildren(id));
        }
        if let Some(task) = self.tasks.get_mut(&id) {
            task.state = state;
            if task.ended.is_none() {
                task.ended = Some(now_local());
            }
        }
        debug!("task {} marked {}", id, state);
        Ok(())
    }

    // ---- inheritance and urgency ------------------------------------

    /// Nearest non-null `base_urgency` on the parent chain, else the
    /// list default.
    pub fn base_urgency_of(&self, id: TaskId) -> Result<f64> {
        self.resolve(id, |task| task.base_urgency, self.base_urgency)
    }

    pub fn age_urgency_factor_of(&self, id: TaskId) -> Result<f64> {
        self.resolve(id, |task| task.age_urgency_factor, self.age_urgency_factor)
    }

    pub fn age_urgency_max_of(&self, id: TaskId) -> Result<f64> {
        self.resolve(id, |task| task.age_urgency_max, self.age_urgency_max)
    }

    fn resolve(
        &self,
        id: TaskId,
        pick: impl Fn(&Task) -> Option<f64>,
        fallback: f64,
    ) -> Result<f64> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let task = self.task(current)?;
            if let Some(value) = pick(task) {
                return Ok(value);
            }
            cursor = task.parent;
        }
        Ok(fallback)
    }

    /// Scalar priority at `now`: resolved base urgency plus age growth,
    /// capped from below by the resolved age-urgency maximum. Age can
    /// only ever raise the score relative to the cap.
    pub fn urgency(&self, id: TaskId, now: Timestamp) -> Result<f64> {
        let task = self.task(id)?;
        let age_days = (now - task.created).num_milliseconds() as f64 / 86_400_000.0;
        let growth = age_days * self.age_urgency_factor_of(id)?;
        let cap = self.age_urgency_max_of(id)?;
        Ok(self.base_urgency_of(id)? + growth.max(cap))
    }

    // ---- dependency graph -------------------------------------------

    /// Tasks held up by `id`: its declared `blocks` targets plus every
    /// task that declares `id` in its own `requires`. Direct targets
    /// come first; the reverse term is a scan over the whole list.
    pub fn blocked_by_this(&self, id: TaskId) -> Result<Vec<TaskId>> {
        self.reconciled(id, |task| &task.blocks, |task| &task.requires)
    }

    /// Tasks holding `id` up: its declared `requires` targets plus every
    /// task that declares `id` in its own `blocks`.
    pub fn blocking_this(&self, id: TaskId) -> Result<Vec<TaskId>> {
        self.reconciled(id, |task| &task.requires, |task| &task.blocks)
    }

    fn reconciled(
        &self,
        id: TaskId,
        direct: impl Fn(&Task) -> &[TaskId],
        reverse: impl Fn(&Task) -> &[TaskId],
    ) -> Result<Vec<TaskId>> {
        let task = self.task(id)?;
        let mut found = Vec::new();
        for &target in direct(task) {
            self.task(target)?;
            if !found.contains(&target) {
                found.push(target);
            }
        }
        for other in self.tasks.values() {
            if reverse(other).contains(&id) && !found.contains(&other.uuid) {
                found.push(other.uuid);
            }
        }
        Ok(found)
    }

    // ---- construction and validation --------------------------------

    /// Flattens a spec subtree into the arena, checking duplicate ids
    /// and the child-state admission table on the way down.
    fn insert_tree(&mut self, spec: TaskSpec, parent: Option<TaskId>) -> Result<TaskId> {
        let (node, children) = Task::from_spec(spec, parent);
        let id = node.uuid;
        if self.tasks.contains_key(&id) || self.templates.contains_key(&id) {
            return Err(ModelError::DuplicateId(id));
        }
        if let Some(parent_id) = parent {
            let parent_state = self.task(parent_id)?.state;
            if !parent_state.admits(node.state) {
                return Err(ModelError::ChildState {
                    parent: parent_id,
                    child: id,
                    parent_state,
                    child_state: node.state,
                });
            }
        }
        self.tasks.insert(id, node);
        let mut child_ids = Vec::with_capacity(children.len());
        for child in children {
            child_ids.push(self.insert_tree(child, Some(id))?);
        }
        if let Some(task) = self.tasks.get_mut(&id) {
            task.children = child_ids;
        }
        Ok(id)
    }

    fn insert_template_tree(
        &mut self,
        spec: TemplateSpec,
        parent: Option<TaskId>,
        schedule: TaskId,
    ) -> Result<TaskId> {
        let (node, children) = TaskTemplate::from_spec(spec, parent, schedule);
        let id = node.uuid;
        if self.templates.contains_key(&id) || self.tasks.contains_key(&id) {
            return Err(ModelError::DuplicateId(id));
        }
        self.templates.insert(id, node);
        let mut child_ids = Vec::with_capacity(children.len());
        for child in children {
            child_ids.push(self.insert_template_tree(child, Some(id), schedule)?);
        }
        if let Some(template) = self.templates.get_mut(&id) {
            template.children = child_ids;
        }
        Ok(id)
    }

    fn insert_schedule(&mut self, spec: ScheduleSpec) -> Result<()> {
        let id = spec.uuid;
        if self.schedules.contains_key(&id) {
            return Err(ModelError::DuplicateId(id));
        }
        let mut roots = Vec::with_capacity(spec.tasks.len());
        for template in spec.tasks {
            roots.push(self.insert_template_tree(template, None, id)?);
        }
        self.schedules.insert(
            id,
            TaskSchedule {
                uuid: id,
                schedule: spec.schedule,
                roots,
            },
        );
        self.schedule_order.push(id);
        Ok(())
    }

    /// Full validation pass over the forest: reachability, child-state
    /// admission, tag references, and dependency cycles. Run after every
    /// structural change; the whole construction is rejected on the
    /// first violation.
    pub fn rebuild(&mut self) -> Result<()> {
        self.check_reachability()?;
        self.check_admission()?;
        self.check_tags()?;
        self.check_dependencies()?;
        info!(
            "task list rebuilt: {} tasks, {} templates, {} schedules, {} tags",
            self.tasks.len(),
            self.templates.len(),
            self.schedules.len(),
            self.tags.len()
        );
        Ok(())
    }

    fn check_reachability(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.tasks.len());
        let mut stack: Vec<TaskId> = self.roots.clone();
        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                return Err(ModelError::DuplicateId(id));
            }
            stack.extend_from_slice(&self.task(id)?.children);
        }
        // Every arena entry must be reachable from some root.
        for id in self.tasks.keys() {
            if !seen.contains(id) {
                return Err(ModelError::UnknownTask(*id));
            }
        }
        let mut seen = HashSet::with_capacity(self.templates.len());
        for schedule in self.schedules.values() {
            let mut stack = schedule.roots.clone();
            while let Some(id) = stack.pop() {
                if !seen.insert(id) {
                    return Err(ModelError::DuplicateId(id));
                }
                stack.extend_from_slice(&self.template(id)?.children);
            }
        }
        for id in self.templates.keys() {
            if !seen.contains(id) {
                return Err(ModelError::UnknownTemplate(*id));
            }
        }
        Ok(())
    }

    fn check_admission(&self) -> Result<()> {
        for task in self.tasks.values() {
            for child_id in &task.children {
                let child = self.task(*child_id)?;
                if !task.state.admits(child.state) {
                    return Err(ModelError::ChildState {
                        parent: task.uuid,
                        child: child.uuid,
                        parent_state: task.state,
                        child_state: child.state,
                    });
                }
            }
        }
        Ok(())
    }

    fn check_tags(&self) -> Result<()> {
        let task_tags = self.tasks.values().flat_map(|task| &task.tags);
        let template_tags = self.templates.values().flat_map(|template| &template.tags);
        for name in task_tags.chain(template_tags) {
            if !self.tags.contains_key(name) {
                return Err(ModelError::UndeclaredTag(name.clone()));
            }
        }
        Ok(())
    }

    /// Rejects cycles in the reconciled dependency graph (requires edges
    /// plus reversed blocks edges). Edge targets that resolve to nothing
    /// only warn here; a query that dereferences them later fails.
    fn check_dependencies(&self) -> Result<()> {
        for task in self.tasks.values() {
            for target in task.requires.iter().chain(&task.blocks) {
                if !self.tasks.contains_key(target) {
                    warn!("task {} references unknown task {}", task.uuid, target);
                }
            }
        }
        let mut visited = HashSet::new();
        for &id in self.tasks.keys() {
            let mut path = HashSet::new();
            self.cycle_walk(id, &mut visited, &mut path)?;
        }
        Ok(())
    }

    fn cycle_walk(
        &self,
        id: TaskId,
        visited: &mut HashSet<TaskId>,
        path: &mut HashSet<TaskId>,
    ) -> Result<()> {
        if path.contains(&id) {
            return Err(ModelError::DependencyCycle(id));
        }
        if !visited.insert(id) {
            return Ok(());
        }
        path.insert(id);
        let Some(task) = self.tasks.get(&id) else {
            path.remove(&id);
            return Ok(());
        };
        for &blocker in &task.requires {
            if self.tasks.contains_key(&blocker) {
                self.cycle_walk(blocker, visited, path)?;
            }
        }
        for other in self.tasks.values() {
            if other.blocks.contains(&id) {
                self.cycle_walk(other.uuid, visited, path)?;
            }
        }
        path.remove(&id);
        Ok(())
    }

    // ---- serialization ----------------------------------------------

    fn task_spec(&self, id: TaskId) -> Option<TaskSpec> {
        let task = self.tasks.get(&id)?;
        Some(TaskSpec {
            title: task.title.clone(),
            uuid: task.uuid,
            state: task.state,
            created: Some(task.created),
            wait: task.wait,
            due: task.due,
            ended: task.ended,
            children: task
                .children
                .iter()
                .filter_map(|child| self.task_spec(*child))
                .collect(),
            requires: task.requires.clone(),
            blocks: task.blocks.clone(),
            tags: task.tags.clone(),
            base_urgency: task.base_urgency,
            age_urgency_factor: task.age_urgency_factor,
            age_urgency_max: task.age_urgency_max,
        })
    }

    fn template_spec(&self, id: TaskId) -> Option<TemplateSpec> {
        let template = self.templates.get(&id)?;
        Some(TemplateSpec {
            title: template.title.clone(),
            uuid: template.uuid,
            wait: template.wait,
            due: template.due,
            children: template
                .children
                .iter()
                .filter_map(|child| self.template_spec(*child))
                .collect(),
            requires: template.requires.clone(),
            blocks: template.blocks.clone(),
            tags: template.tags.clone(),
            base_urgency: template.base_urgency,
            age_urgency_factor: template.age_urgency_factor,
            age_urgency_max: template.age_urgency_max,
        })
    }
}

impl TryFrom<TaskListSpec> for TaskList {
    type Error = ModelError;

    fn try_from(spec: TaskListSpec) -> Result<Self> {
        let mut list = TaskList::empty();
        list.base_urgency = spec.base_urgency;
        list.age_urgency_factor = spec.age_urgency_factor;
        list.age_urgency_max = spec.age_urgency_max;
        for tag in spec.tags {
            list.declare_tag(tag);
        }
        for task in spec.tasks {
            let id = list.insert_tree(task, None)?;
            list.roots.push(id);
        }
        for schedule in spec.recurring_tasks {
            list.insert_schedule(schedule)?;
        }
        list.rebuild()?;
        Ok(list)
    }
}

impl From<TaskList> for TaskListSpec {
    fn from(list: TaskList) -> TaskListSpec {
        TaskListSpec {
            base_urgency: list.base_urgency,
            age_urgency_factor: list.age_urgency_factor,
            age_urgency_max: list.age_urgency_max,
            tasks: list
                .roots
                .iter()
                .filter_map(|id| list.task_spec(*id))
                .collect(),
            recurring_tasks: list
                .schedule_order
                .iter()
                .filter_map(|id| {
                    let schedule = list.schedules.get(id)?;
                    Some(ScheduleSpec {
                        uuid: schedule.uuid,
                        schedule: schedule.schedule.clone(),
                        tasks: schedule
                            .roots
                            .iter()
                            .filter_map(|root| list.template_spec(*root))
                            .collect(),
                    })
                })
                .collect(),
            tags: list
                .tag_order
                .iter()
                .filter_map(|name| list.tags.get(name).cloned())
                .collect(),
        }
    }
}
