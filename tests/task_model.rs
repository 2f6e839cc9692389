//! Lifecycle, urgency, and dependency behavior of a whole task list.

use anyhow::Result;
use chrono::TimeDelta;
use taskforest::recur::{Frequency, OccurrenceQuery, RuleSpec};
use taskforest::task::{
    ScheduleSource, ScheduleSpec, Tag, TaskList, TaskListSpec, TaskSpec, TaskState, TemplateSpec,
};
use taskforest::time::{Timestamp, parse_timestamp};
use taskforest::{ModelError, RecurrenceRule};

fn ts(raw: &str) -> Timestamp {
    parse_timestamp(raw).expect("test timestamps are well formed")
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

#[test]
fn test_single_todo_task_urgency_is_base_plus_cap() -> Result<()> {
    // base 5, factor 0, cap 2: urgency 7 at any now.
    let list = TaskList::new(TaskListSpec {
        tasks: vec![TaskSpec {
            state: TaskState::Todo,
            base_urgency: Some(5.0),
            age_urgency_factor: Some(0.0),
            age_urgency_max: Some(2.0),
            ..TaskSpec::new("T")
        }],
        ..TaskListSpec::default()
    })?;
    let id = list.roots()[0];
    for now in [
        "2024-01-01T00:00:00+00:00",
        "2027-07-07T07:07:07+07:00",
        "2099-12-31T23:59:59-05:00",
    ] {
        assert_eq!(list.urgency(id, ts(now))?, 7.0);
    }
    Ok(())
}

#[test]
fn test_project_lifecycle_bottom_up() -> Result<()> {
    init_tracing();
    let list_spec = TaskListSpec {
        tasks: vec![TaskSpec {
            children: vec![
                TaskSpec::new("outline"),
                TaskSpec {
                    children: vec![TaskSpec::new("draft chapter 1")],
                    ..TaskSpec::new("write")
                },
            ],
            ..TaskSpec::new("book")
        }],
        ..TaskListSpec::default()
    };
    let mut list = TaskList::new(list_spec)?;
    let book = list.roots()[0];
    let outline = list.task(book)?.children()[0];
    let write = list.task(book)?.children()[1];
    let draft = list.task(write)?.children()[0];

    // The root cannot finish while anything below is open.
    assert!(matches!(
        list.mark_done(book),
        Err(ModelError::OpenChildren(_))
    ));

    list.mark_done(draft)?;
    list.mark_done(outline)?;
    list.mark_done(write)?;
    list.mark_done(book)?;

    for id in [book, outline, write, draft] {
        let task = list.task(id)?;
        assert_eq!(task.state(), TaskState::Done);
        assert!(task.ended().is_some());
    }
    Ok(())
}

#[test]
fn test_inheritance_feeds_urgency() -> Result<()> {
    // The project sets the urgency parameters; the subtask inherits all
    // three through the parent chain.
    let created = ts("2024-01-01T00:00:00+00:00");
    let list = TaskList::new(TaskListSpec {
        tasks: vec![TaskSpec {
            base_urgency: Some(10.0),
            age_urgency_factor: Some(1.0),
            age_urgency_max: Some(0.0),
            children: vec![TaskSpec {
                created: Some(created),
                ..TaskSpec::new("subtask")
            }],
            created: Some(created),
            ..TaskSpec::new("project")
        }],
        ..TaskListSpec::default()
    })?;
    let project = list.roots()[0];
    let subtask = list.task(project)?.children()[0];

    assert_eq!(list.base_urgency_of(subtask)?, 10.0);
    let later = created + TimeDelta::days(3);
    assert_eq!(list.urgency(subtask, later)?, 13.0);
    assert_eq!(list.urgency(subtask, later)?, list.urgency(project, later)?);
    Ok(())
}

#[test]
fn test_dependency_graph_across_the_list() -> Result<()> {
    let pour_foundation = TaskSpec::new("pour foundation");
    let frame_walls = TaskSpec {
        requires: vec![pour_foundation.uuid],
        ..TaskSpec::new("frame walls")
    };
    let inspection = TaskSpec::new("inspection");
    let permit = TaskSpec {
        blocks: vec![pour_foundation.uuid],
        ..TaskSpec::new("permit")
    };
    let ids = [
        pour_foundation.uuid,
        frame_walls.uuid,
        inspection.uuid,
        permit.uuid,
    ];
    let list = TaskList::new(TaskListSpec {
        tasks: vec![pour_foundation, frame_walls, inspection, permit],
        ..TaskListSpec::default()
    })?;
    let [foundation, walls, inspection, permit] = ids;

    // Reconciled from both declaration directions.
    assert_eq!(list.blocking_this(foundation)?, vec![permit]);
    assert_eq!(list.blocked_by_this(foundation)?, vec![walls]);
    assert_eq!(list.blocked_by_this(permit)?, vec![foundation]);
    assert!(list.blocked_by_this(inspection)?.is_empty());
    assert!(list.blocking_this(inspection)?.is_empty());
    Ok(())
}

#[test]
fn test_weighted_tags_survive_the_build() -> Result<()> {
    let list = TaskList::new(TaskListSpec {
        tasks: vec![TaskSpec {
            tags: vec!["deep-work".into(), "home".into()],
            ..TaskSpec::new("t")
        }],
        tags: vec![Tag::weighted("deep-work", 2.0), Tag::named("home")],
        ..TaskListSpec::default()
    })?;
    assert_eq!(list.tag("deep-work").map(|t| t.urgency_factor), Some(2.0));
    assert_eq!(list.tag("home").map(|t| t.urgency_factor), Some(0.0));
    assert!(list.tag("work").is_none());
    Ok(())
}

#[test]
fn test_schedule_binds_rule_to_template_forest() -> Result<()> {
    let rule = RecurrenceRule::new(RuleSpec {
        freq: Frequency::Monthly,
        dtstart: Some(ts("2024-01-05T09:00:00+00:00")),
        count: Some(6),
        ..RuleSpec::default()
    })?;
    let template = TemplateSpec {
        children: vec![TemplateSpec::new("gather receipts")],
        ..TemplateSpec::new("monthly bookkeeping")
    };
    let template_id = template.uuid;
    let schedule = ScheduleSpec {
        uuid: uuid::Uuid::new_v4(),
        schedule: ScheduleSource::Rule(rule),
        tasks: vec![template],
    };
    let schedule_id = schedule.uuid;
    let list = TaskList::new(TaskListSpec {
        recurring_tasks: vec![schedule],
        ..TaskListSpec::default()
    })?;

    let found = list.schedule(schedule_id)?;
    assert_eq!(found.template_roots(), &[template_id]);
    let anchored = found.anchored(ts("2024-01-01T00:00:00+00:00"));
    assert_eq!(
        anchored.nth_occurrence(1),
        Some(ts("2024-02-05T09:00:00+00:00"))
    );

    // Both templates in the subtree point back at the schedule.
    assert_eq!(list.all_templates().count(), 2);
    for template in list.all_templates() {
        assert_eq!(template.schedule(), schedule_id);
    }
    Ok(())
}

#[test]
fn test_detach_then_rebuild_keeps_the_rest_consistent() -> Result<()> {
    let keep = TaskSpec::new("keep");
    let drop_me = TaskSpec {
        children: vec![TaskSpec::new("inner")],
        ..TaskSpec::new("drop me")
    };
    let (keep_id, drop_id) = (keep.uuid, drop_me.uuid);
    let mut list = TaskList::new(TaskListSpec {
        tasks: vec![keep, drop_me],
        ..TaskListSpec::default()
    })?;
    assert_eq!(list.task_count(), 3);

    list.detach(drop_id)?;
    assert_eq!(list.task_count(), 1);
    assert_eq!(list.roots(), &[keep_id]);
    assert!(matches!(
        list.task(drop_id),
        Err(ModelError::UnknownTask(_))
    ));

    // The survivor still works.
    list.mark_done(keep_id)?;
    assert_eq!(list.task(keep_id)?.state(), TaskState::Done);
    Ok(())
}
