use datamate_core::{
    progress_percent, DatasetRef, TaskDetail, TaskList, PERCENT_CAP, UNREGISTERED_REQ_ID,
};

fn detail(id: &str) -> TaskDetail {
    TaskDetail {
        dataset: DatasetRef {
            id: id.to_string(),
            name: format!("dataset-{id}"),
        },
        update_event: Some("update:dataset".to_string()),
        has_archive: false,
        prefix: Some("raw/".to_string()),
    }
}

#[test]
fn created_tasks_are_most_recent_first() {
    let mut list = TaskList::new();
    let first = list.create(&detail("1"));
    list.create(&detail("2"));

    assert_eq!(first.req_id, UNREGISTERED_REQ_ID);
    assert_eq!(first.title, "Upload dataset: dataset-1");
    assert_eq!(first.percent, 0.0);
    let keys: Vec<_> = list.tasks().iter().map(|t| t.key.as_str()).collect();
    assert_eq!(keys, vec!["2", "1"]);
}

#[test]
fn recreating_a_key_replaces_the_old_task() {
    let mut list = TaskList::new();
    list.create(&detail("1"));
    list.apply_progress("1", 10, 100);
    list.create(&detail("2"));
    list.create(&detail("1"));

    assert_eq!(list.len(), 2);
    assert_eq!(list.tasks()[0].key, "1");
    assert_eq!(list.tasks()[0].size, 0);
}

#[test]
fn progress_rounds_and_caps_below_hundred() {
    assert_eq!(progress_percent(100, 250), 40.0);
    assert_eq!(progress_percent(1, 3), 33.33);
    assert_eq!(progress_percent(250, 250), PERCENT_CAP);
    assert_eq!(progress_percent(99_999, 100_000), PERCENT_CAP);
    assert_eq!(progress_percent(0, 0), 0.0);
}

#[test]
fn progress_never_moves_backwards() {
    let mut list = TaskList::new();
    list.create(&detail("1"));
    list.set_registered("1", 42);

    let task = list.apply_progress("1", 100, 250).unwrap();
    assert_eq!((task.size, task.percent, task.req_id), (100, 40.0, 42));

    let task = list.apply_progress("1", 50, 250).unwrap();
    assert_eq!(task.size, 100);
}

#[test]
fn unknown_keys_are_ignored() {
    let mut list = TaskList::new();
    assert!(list.apply_progress("nope", 1, 2).is_none());
    assert!(list.mark_cancelled("nope").is_none());
    assert!(list.remove("nope").is_none());
    assert!(list.is_empty());
}

#[test]
fn cancel_then_remove() {
    let mut list = TaskList::new();
    list.create(&detail("1"));
    assert!(list.mark_cancelled("1").unwrap().is_cancel);

    let removed = list.remove("1").unwrap();
    assert!(removed.is_cancel);
    assert!(!list.contains("1"));
    assert!(list.rows().is_empty());
}
