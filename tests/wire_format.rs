//! Wire forms of the whole model: compact shapes, strict rejection of
//! invalid documents, and list-level round trips.

use anyhow::Result;
use serde_json::json;
use taskforest::recur::OccurrenceQuery;
use taskforest::task::{ScheduleSource, TaskList, TaskState};
use taskforest::time::parse_timestamp;

#[test]
fn test_task_list_document_round_trips() -> Result<()> {
    let document = json!({
        "baseUrgency": 1.0,
        "tags": ["home", {"name": "urgent", "urgencyFactor": 3.0}],
        "tasks": [
            {
                "title": "garden",
                "state": "todo",
                "created": "2024-04-01T10:00:00+02:00",
                "tags": "home",
                "children": {
                    "title": "weed the beds",
                    "due": "2024-04-20",
                    "tags": ["home", "urgent"]
                }
            }
        ],
        "recurringTasks": [
            {
                "schedule": "P1M",
                "tasks": {"title": "pay rent", "due": "P3D"}
            }
        ]
    });

    let list: TaskList = serde_json::from_value(document)?;
    assert_eq!(list.task_count(), 2);
    assert_eq!(list.all_schedules().count(), 1);

    let garden = list.task(list.roots()[0])?;
    assert_eq!(garden.title(), "garden");
    assert_eq!(garden.tags(), &["home".to_string()]);
    let weed = list.task(garden.children()[0])?;
    assert_eq!(weed.tags().len(), 2);

    let rendered = serde_json::to_value(&list)?;
    // Singleton tag list collapses back to the bare string; the zero
    // weight tag stays a bare name.
    assert_eq!(rendered["tasks"]["tags"], json!("home"));
    assert_eq!(rendered["tags"][0], json!("home"));
    assert_eq!(
        rendered["tags"][1],
        json!({"name": "urgent", "urgencyFactor": 3.0})
    );
    // The monthly duration source keeps its compact text form.
    assert_eq!(rendered["recurringTasks"]["schedule"], json!("P1M"));

    let reparsed: TaskList = serde_json::from_value(rendered)?;
    assert_eq!(reparsed, list);
    Ok(())
}

#[test]
fn test_naive_created_normalizes_at_ingestion() -> Result<()> {
    let list: TaskList = serde_json::from_value(json!({
        "tasks": [{"title": "t", "created": "2024-04-01T10:00:00"}],
        "tags": []
    }))?;
    let task = list.task(list.roots()[0])?;
    // Normalized once to an aware instant in the local zone; the wall
    // clock reading survives.
    assert_eq!(
        task.created().naive_local(),
        parse_timestamp("2024-04-01T10:00:00")?.naive_local()
    );
    Ok(())
}

#[test]
fn test_schedule_source_shapes() -> Result<()> {
    let duration: ScheduleSource = serde_json::from_value(json!("P2W"))?;
    assert!(matches!(duration, ScheduleSource::Every(_)));

    let rule: ScheduleSource = serde_json::from_value(json!({
        "freq": "WEEKLY",
        "dtstart": "2024-01-01T09:00:00+00:00",
        "byweekday": [{"TU": 2}, "FR"],
        "count": 4
    }))?;
    assert!(matches!(rule, ScheduleSource::Rule(_)));

    let set: ScheduleSource = serde_json::from_value(json!({
        "rrules": {"freq": "DAILY", "dtstart": "2024-01-01T09:00:00+00:00", "count": 3},
        "exdates": "2024-01-02T09:00:00+00:00"
    }))?;
    let ScheduleSource::Set(set) = set else {
        panic!("expected the set form");
    };
    assert_eq!(set.count_occurrences(), 2);
    Ok(())
}

#[test]
fn test_count_and_until_rejected_on_the_wire() {
    let result: std::result::Result<TaskList, _> = serde_json::from_value(json!({
        "tasks": [],
        "tags": [],
        "recurringTasks": [{
            "schedule": {
                "freq": "DAILY",
                "count": 3,
                "until": "2024-12-31T00:00:00+00:00"
            },
            "tasks": {"title": "t"}
        }]
    }));
    assert!(result.is_err());
}

#[test]
fn test_unknown_fields_rejected() {
    // The singleton-or-list wrapper reports a generic variant mismatch,
    // so only the rejection itself is observable here.
    let result: std::result::Result<TaskList, _> = serde_json::from_value(json!({
        "tasks": [{"title": "t", "priority": "high"}],
        "tags": []
    }));
    assert!(result.is_err());
}

#[test]
fn test_admission_violation_rejects_the_document() {
    let result: std::result::Result<TaskList, _> = serde_json::from_value(json!({
        "tasks": [{
            "title": "finished",
            "state": "done",
            "children": {"title": "still open", "state": "todo"}
        }],
        "tags": []
    }));
    let message = result.unwrap_err().to_string();
    assert!(message.contains("cannot have child"), "unexpected error: {message}");
}

#[test]
fn test_undeclared_tag_rejects_the_document() {
    let result: std::result::Result<TaskList, _> = serde_json::from_value(json!({
        "tasks": [{"title": "t", "tags": "missing"}],
        "tags": []
    }));
    assert!(result.is_err());
}

#[test]
fn test_duplicate_uuid_rejects_the_document() {
    let id = "6ba7b810-9dad-11d1-80b4-00c04fd430c8";
    let result: std::result::Result<TaskList, _> = serde_json::from_value(json!({
        "tasks": [
            {"title": "a", "uuid": id},
            {"title": "b", "uuid": id}
        ],
        "tags": []
    }));
    assert!(result.is_err());
}

#[test]
fn test_zero_weekday_ordinal_rejected() {
    let result: std::result::Result<TaskList, _> = serde_json::from_value(json!({
        "tasks": [],
        "tags": [],
        "recurringTasks": [{
            "schedule": {"freq": "MONTHLY", "byweekday": {"MO": 0}, "count": 1},
            "tasks": {"title": "t"}
        }]
    }));
    assert!(result.is_err());
}

#[test]
fn test_terminal_state_serializes_with_ended() -> Result<()> {
    let list: TaskList = serde_json::from_value(json!({
        "tasks": [{"title": "t", "state": "dropped"}],
        "tags": []
    }))?;
    let task = list.task(list.roots()[0])?;
    assert_eq!(task.state(), TaskState::Dropped);
    assert!(task.ended().is_some(), "terminal tasks get stamped");

    let rendered = serde_json::to_value(&list)?;
    assert!(rendered["tasks"]["ended"].is_string());
    Ok(())
}
