use deploy_core::error::DeployError;
use deploy_core::task::{Task, TaskId, TaskStatus};

#[test]
fn test_new_task_is_pending() {
    let task = Task::new("web-1", "java", "11");
    assert_eq!(task.id(), &TaskId::new("web-1", "java", "11"));
    assert_eq!(task.id().as_str(), "web-1_java_11");
    assert_eq!(task.status(), TaskStatus::Pending);
    assert_eq!(task.progress(), 0.0);
    assert!(task.started_at().is_none());
    assert!(task.finished_at().is_none());
    assert!(task.error_message().is_none());
    assert!(task.duration().is_none());
}

#[test]
fn test_progress_is_clamped() {
    let mut task = Task::new("n", "java", "11");
    task.update_progress(150.0);
    assert_eq!(task.progress(), 100.0);
    task.update_progress(-10.0);
    assert_eq!(task.progress(), 0.0);
    task.update_progress(f64::NAN);
    assert_eq!(task.progress(), 0.0);
    task.update_progress(42.5);
    assert_eq!(task.progress(), 42.5);
}

#[test]
fn test_complete_sets_progress_and_end_time() {
    let mut task = Task::new("n", "java", "11");
    task.start().unwrap();
    assert_eq!(task.status(), TaskStatus::Running);
    assert!(task.started_at().is_some());

    task.update_progress(60.0);
    task.complete().unwrap();
    assert_eq!(task.status(), TaskStatus::Completed);
    assert_eq!(task.progress(), 100.0);
    assert!(task.finished_at().is_some());
    assert!(task.duration().unwrap() >= chrono::Duration::zero());
}

#[test]
fn test_fail_records_message() {
    let mut task = Task::new("n", "java", "11");
    task.start().unwrap();
    task.fail("Installation failed: boom").unwrap();
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_message(), Some("Installation failed: boom"));
    assert!(task.finished_at().is_some());
}

#[test]
fn test_complete_and_fail_require_running() {
    let mut task = Task::new("n", "java", "11");
    assert!(matches!(
        task.complete(),
        Err(DeployError::InvalidTransition {
            from: TaskStatus::Pending,
            to: TaskStatus::Completed,
            ..
        })
    ));
    assert!(task.fail("nope").is_err());
    assert_eq!(task.status(), TaskStatus::Pending);
}

#[test]
fn test_skip_from_pending() {
    let mut task = Task::new("n", "java", "11");
    task.skip("Deployment stopped by user").unwrap();
    assert_eq!(task.status(), TaskStatus::Skipped);
    assert_eq!(task.error_message(), Some("Deployment stopped by user"));
    assert!(task.status().is_terminal());
}

#[test]
fn test_terminal_states_are_final() {
    let mut task = Task::new("n", "java", "11");
    task.start().unwrap();
    task.complete().unwrap();

    assert!(task.start().is_err());
    assert!(task.fail("late").is_err());
    assert!(task.skip("late").is_err());
    assert_eq!(task.status(), TaskStatus::Completed);
    assert!(task.error_message().is_none());
}

#[test]
fn test_status_display() {
    let rendered: Vec<String> = TaskStatus::ALL.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        ["pending", "running", "completed", "failed", "skipped"]
    );
}

#[test]
fn test_summary_json() {
    let mut task = Task::new("db-1", "zookeeper", "3.8.4");
    task.start().unwrap();
    task.fail("Verification failed: binaries missing").unwrap();

    let json = task.to_summary_json();
    assert_eq!(json["task_id"], "db-1_zookeeper_3.8.4");
    assert_eq!(json["status"], "failed");
    assert_eq!(json["error_message"], "Verification failed: binaries missing");
    assert!(json["started_at"].is_string());
    assert!(json["duration_secs"].is_number());
}
