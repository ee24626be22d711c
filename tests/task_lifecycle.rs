//! End-to-end task graph behavior: readiness, cascade-unblocking,
//! molecule exclusion, and cycle rejection.

use agentcore::task::{CreateTaskParams, DepType, Priority, Status, TaskId, TaskStore, TaskType, TaskStoreError};

#[test]
fn blocked_task_becomes_ready_once_its_blocker_completes() {
    let mut store = TaskStore::open_in_memory().unwrap();

    let blocker = store
        .create_task(CreateTaskParams {
            title: "set up schema".to_string(),
            priority: Priority::High,
            task_type: TaskType::Task,
            ..Default::default()
        })
        .unwrap();

    let blocked = store
        .create_task(CreateTaskParams {
            title: "write migration".to_string(),
            priority: Priority::High,
            task_type: TaskType::Task,
            blocked_by: vec![blocker.clone()],
            ..Default::default()
        })
        .unwrap();

    let ready_ids: Vec<TaskId> = store.get_ready_tasks().into_iter().map(|t| t.id).collect();
    assert!(ready_ids.contains(&blocker));
    assert!(!ready_ids.contains(&blocked));

    store.complete_task(&blocker).unwrap();

    let ready_ids: Vec<TaskId> = store.get_ready_tasks().into_iter().map(|t| t.id).collect();
    assert!(ready_ids.contains(&blocked));
}

#[test]
fn molecule_tasks_never_appear_in_ready_list_and_cannot_be_started() {
    let mut store = TaskStore::open_in_memory().unwrap();
    let epic = store
        .create_task(CreateTaskParams {
            title: "ship dark mode".to_string(),
            task_type: TaskType::Molecule,
            ..Default::default()
        })
        .unwrap();

    let ready = store.get_ready_tasks();
    assert!(!ready.iter().any(|t| t.id == epic));
    assert!(store.set_current_task(&epic).is_err());
}

#[test]
fn molecules_reject_blocked_by_on_creation() {
    let mut store = TaskStore::open_in_memory().unwrap();
    let blocker = store
        .create_task(CreateTaskParams { title: "prep".to_string(), ..Default::default() })
        .unwrap();

    let result = store.create_task(CreateTaskParams {
        title: "epic".to_string(),
        task_type: TaskType::Molecule,
        blocked_by: vec![blocker],
        ..Default::default()
    });
    assert!(matches!(result, Err(TaskStoreError::CannotBlockMolecule(_))));
}

#[test]
fn adding_a_dependency_that_would_cycle_is_rejected() {
    let mut store = TaskStore::open_in_memory().unwrap();
    let a = store.create_task(CreateTaskParams { title: "a".to_string(), ..Default::default() }).unwrap();
    let b = store
        .create_task(CreateTaskParams { title: "b".to_string(), blocked_by: vec![a.clone()], ..Default::default() })
        .unwrap();

    // b is already blocked_by a (a blocks b). Adding a `blocks` edge from b
    // back onto a would close a cycle.
    let result = store.add_dependency(&b, &a, DepType::Blocks);
    assert!(matches!(result, Err(TaskStoreError::CircularDependency { .. })));
}

#[test]
fn completing_a_task_cascades_readiness_to_its_dependents() {
    let mut store = TaskStore::open_in_memory().unwrap();
    let first = store
        .create_task(CreateTaskParams { title: "11111111".to_string(), ..Default::default() })
        .unwrap();
    let second = store
        .create_task(CreateTaskParams {
            title: "22222222".to_string(),
            blocked_by: vec![first.clone()],
            ..Default::default()
        })
        .unwrap();

    assert_eq!(store.get_task(&second).unwrap().status, Status::Blocked);
    let unblocked = store.complete_task(&first).unwrap();
    assert!(unblocked.contains(&second));
    assert_eq!(store.get_task(&second).unwrap().status, Status::Pending);
    assert!(store.get_ready_tasks().iter().any(|t| t.id == second));
}

#[test]
fn comments_and_epic_summary_round_trip() {
    let mut store = TaskStore::open_in_memory().unwrap();
    let epic = store
        .create_task(CreateTaskParams { title: "epic".to_string(), task_type: TaskType::Molecule, ..Default::default() })
        .unwrap();
    let child = store
        .create_task(CreateTaskParams { title: "child".to_string(), parent_id: Some(epic.clone()), ..Default::default() })
        .unwrap();
    store.add_comment(&child, "planner", "QUEUED: waiting on design review").unwrap();
    store.complete_task(&child).unwrap();

    let summary = store.get_epic_summary(&epic).unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.completed, 1);
}
