mod common;

use common::StubBackend;
use deploy_core::config::Config;
use deploy_core::events::{Event, EventKind};
use deploy_core::executor::{DeploymentExecutor, ExecutorSettings, STOPPED_REASON};
use deploy_core::registry::TaskRegistry;
use deploy_core::task::{TaskId, TaskStatus};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn executor(config: &Config, stub: Arc<StubBackend>) -> DeploymentExecutor {
    let registry = Arc::new(TaskRegistry::from_nodes(&config.nodes));
    DeploymentExecutor::builder(config.nodes.clone(), registry, stub)
        .settings(ExecutorSettings {
            playbook_dir: common::playbook_dir(),
            ..ExecutorSettings::from_config(config, false)
        })
        .build()
}

fn status(executor: &DeploymentExecutor, node: &str, software: &str, version: &str) -> TaskStatus {
    executor
        .registry()
        .get_task(&TaskId::new(node, software, version))
        .unwrap()
        .status()
}

fn healthy_stub() -> Arc<StubBackend> {
    let stub = StubBackend::healthy();
    stub.respond("zkServer.sh && echo found", 0, "found");
    Arc::new(stub)
}

#[tokio::test]
async fn test_all_tasks_complete() {
    let config = common::config(&[
        ("web-1", "java:11,zookeeper:3.8.4"),
        ("web-2", "python:3.11"),
    ]);
    let stub = healthy_stub();
    let executor = executor(&config, stub.clone());

    let started = Arc::new(AtomicUsize::new(0));
    let counter = started.clone();
    executor.register_callback(EventKind::TaskStart, move |event| {
        assert_eq!(event.task().unwrap().status(), TaskStatus::Running);
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let submitted = executor.execute_all();
    assert_eq!(submitted, ["web-1", "web-2"]);
    assert!(executor.wait_completion(None).await);

    let stats = executor.get_statistics();
    assert_eq!(stats.completed, 3);
    assert_eq!(stats.total, 3);
    assert_eq!(executor.get_progress(), 100.0);
    assert_eq!(started.load(Ordering::SeqCst), 3);
    assert!(!executor.is_running());

    let order: Vec<String> = stub
        .playbooks
        .lock()
        .iter()
        .filter(|(_, _, vars)| vars.contains_key("java_version") || vars.contains_key("zk_version"))
        .map(|(name, _, _)| name.clone())
        .collect();
    assert_eq!(order, ["install_java.yml", "install_zookeeper.yml"]);
}

#[tokio::test]
async fn test_failed_install_stops_node() {
    let config = common::config(&[
        ("web-1", "java:11,python:3.11,zookeeper:3.8.4"),
        ("web-2", "java:11"),
    ]);
    let stub = healthy_stub();
    stub.fail_playbook("install_java.yml", 2);
    let executor = executor(&config, stub.clone());

    let failures = Arc::new(Mutex::new(Vec::new()));
    let seen = failures.clone();
    executor.register_callback(EventKind::TaskFail, move |event| {
        if let Event::TaskFail(task, message) = event {
            seen.lock().push((task.id().to_string(), message.clone()));
        }
        Ok(())
    });

    executor.execute_all();
    assert!(executor.wait_completion(None).await);

    assert_eq!(status(&executor, "web-1", "java", "11"), TaskStatus::Failed);
    assert_eq!(status(&executor, "web-1", "python", "3.11"), TaskStatus::Pending);
    assert_eq!(status(&executor, "web-1", "zookeeper", "3.8.4"), TaskStatus::Pending);
    assert_eq!(status(&executor, "web-2", "java", "11"), TaskStatus::Failed);

    let task = executor
        .registry()
        .get_task(&TaskId::new("web-1", "java", "11"))
        .unwrap();
    assert_eq!(
        task.error_message(),
        Some("Installation failed: Playbook execution failed: install_java.yml (rc 2)")
    );
    assert_eq!(failures.lock().len(), 2);
    assert!(!stub.playbook_names().contains(&"install_python.yml".to_string()));
}

#[tokio::test]
async fn test_failed_checks_fail_task() {
    let config = common::config(&[("web-1", "java:11,python:3.11"), ("web-2", "python:3.11")]);
    let stub = healthy_stub();
    stub.unreachable("10.0.0.1");
    let executor = executor(&config, stub.clone());

    executor.execute_all();
    assert!(executor.wait_completion(Some(Duration::from_secs(5))).await);

    let task = executor
        .registry()
        .get_task(&TaskId::new("web-1", "java", "11"))
        .unwrap();
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(task.error_message(), Some("Pre-installation checks failed: 1 errors"));
    assert_eq!(status(&executor, "web-1", "python", "3.11"), TaskStatus::Pending);
    assert_eq!(status(&executor, "web-2", "python", "3.11"), TaskStatus::Completed);
}

#[tokio::test]
async fn test_verify_failure_fails_task() {
    let config = common::config(&[("zk-1", "zookeeper:3.8.4")]);
    let executor = executor(&config, Arc::new(StubBackend::healthy()));

    executor.execute_all();
    executor.wait_completion(None).await;

    let task = executor
        .registry()
        .get_task(&TaskId::new("zk-1", "zookeeper", "3.8.4"))
        .unwrap();
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(
        task.error_message(),
        Some("Verification failed: Zookeeper binaries not found after installation")
    );
    assert_eq!(task.progress(), 80.0);
}

#[tokio::test]
async fn test_unknown_software_fails_with_unexpected_error() {
    let config = common::config(&[("web-1", "nginx:1.25,java:11")]);
    let executor = executor(&config, healthy_stub());

    executor.execute_all();
    executor.wait_completion(None).await;

    let task = executor
        .registry()
        .get_task(&TaskId::new("web-1", "nginx", "1.25"))
        .unwrap();
    assert_eq!(task.status(), TaskStatus::Failed);
    assert_eq!(
        task.error_message(),
        Some("Unexpected error: No installer found for nginx. Available: java, python, zookeeper")
    );
    assert_eq!(status(&executor, "web-1", "java", "11"), TaskStatus::Pending);
}

#[tokio::test]
async fn test_stop_skips_remaining_tasks() {
    let config = common::config(&[("web-1", "java:11,python:3.11,zookeeper:3.8.4")]);
    let executor = executor(&config, healthy_stub());

    let control = executor.control();
    executor.register_callback(EventKind::TaskComplete, move |_| {
        control.stop();
        Ok(())
    });
    let skipped = Arc::new(AtomicUsize::new(0));
    let counter = skipped.clone();
    executor.register_callback(EventKind::TaskSkip, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    executor.execute_all();
    assert!(executor.wait_completion(Some(Duration::from_secs(5))).await);

    assert!(executor.is_stopped());
    assert_eq!(status(&executor, "web-1", "java", "11"), TaskStatus::Completed);
    for (software, version) in [("python", "3.11"), ("zookeeper", "3.8.4")] {
        let task = executor
            .registry()
            .get_task(&TaskId::new("web-1", software, version))
            .unwrap();
        assert_eq!(task.status(), TaskStatus::Skipped);
        assert_eq!(task.error_message(), Some(STOPPED_REASON));
    }
    assert_eq!(skipped.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_stop_before_start_submits_nothing() {
    let config = common::config(&[("web-1", "java:11"), ("web-2", "java:11")]);
    let executor = executor(&config, healthy_stub());

    executor.stop();
    assert!(executor.execute_all().is_empty());
    assert!(executor.wait_completion(None).await);
    assert_eq!(executor.get_statistics().pending, 2);
}

#[tokio::test]
async fn test_pause_blocks_until_resume() {
    let config = common::config(&[("web-1", "java:11"), ("web-2", "python:3.11")]);
    let executor = executor(&config, healthy_stub());

    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in [EventKind::Pause, EventKind::Resume] {
        let events = events.clone();
        executor.register_callback(kind, move |event| {
            events.lock().push(event.kind().to_string());
            Ok(())
        });
    }

    executor.pause();
    assert!(executor.is_paused());
    executor.execute_all();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(executor.is_running());
    assert_eq!(executor.get_statistics().pending, 2);
    assert!(!executor.wait_completion(Some(Duration::from_millis(50))).await);

    executor.resume();
    assert!(!executor.is_paused());
    assert!(executor.wait_completion(Some(Duration::from_secs(5))).await);
    assert_eq!(executor.get_statistics().completed, 2);
    assert_eq!(*events.lock(), ["on_pause", "on_resume"]);
}

#[tokio::test]
async fn test_stop_releases_paused_workers() {
    let config = common::config(&[("web-1", "java:11,python:3.11")]);
    let executor = executor(&config, healthy_stub());

    executor.pause();
    executor.execute_all();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let control = executor.control();
    std::thread::spawn(move || control.stop()).join().unwrap();

    assert!(executor.wait_completion(Some(Duration::from_secs(5))).await);
    assert!(!executor.is_paused());
    assert_eq!(executor.get_statistics().skipped, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_is_bounded() {
    let nodes: Vec<(String, &str)> = (0..6).map(|i| (format!("node-{}", i), "python:3.11")).collect();
    let nodes: Vec<(&str, &str)> = nodes.iter().map(|(n, s)| (n.as_str(), *s)).collect();
    let config = common::config(&nodes);
    assert_eq!(config.general.max_concurrent_nodes, 2);

    let stub = healthy_stub();
    stub.set_delay(Duration::from_millis(5));
    let executor = executor(&config, stub);

    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    {
        let active = active.clone();
        let peak = peak.clone();
        executor.register_callback(EventKind::TaskStart, move |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            Ok(())
        });
    }
    for kind in [EventKind::TaskComplete, EventKind::TaskFail] {
        let active = active.clone();
        executor.register_callback(kind, move |_| {
            active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });
    }

    executor.execute_all();
    assert!(executor.wait_completion(Some(Duration::from_secs(30))).await);

    assert_eq!(executor.get_statistics().completed, 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
    assert!(peak.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_failing_callbacks_are_isolated() {
    let config = common::config(&[("web-1", "java:11")]);
    let executor = executor(&config, healthy_stub());

    executor.register_callback(EventKind::TaskStart, |_| anyhow::bail!("subscriber broke"));
    executor.register_callback(EventKind::TaskComplete, |_| panic!("subscriber panicked"));

    executor.execute_all();
    assert!(executor.wait_completion(None).await);
    assert_eq!(executor.get_statistics().completed, 1);
}

#[tokio::test]
async fn test_execute_single_node_and_reset() {
    let config = common::config(&[("web-1", "java:11"), ("web-2", "python:3.11")]);
    let executor = executor(&config, healthy_stub());

    executor.execute_node("web-2").await.unwrap();
    assert_eq!(status(&executor, "web-2", "python", "3.11"), TaskStatus::Completed);
    assert_eq!(status(&executor, "web-1", "java", "11"), TaskStatus::Pending);
    assert_eq!(executor.get_progress(), 50.0);
    assert!(executor.execute_node("db-9").await.is_err());

    executor.registry().reset();
    let stats = executor.get_statistics();
    assert_eq!(stats.pending, stats.total);
    assert_eq!(executor.get_progress(), 0.0);
}
