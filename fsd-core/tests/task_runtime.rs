mod support;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use fsd_core::database::NewMetadata;
use fsd_core::disk::DiskUsage;
use fsd_core::procs::ProcRequest;
use fsd_core::tasks::{ProcTask, Task, WorkerOutcome, run_proc_worker};
use fsd_core::{FsWatcher, FsdOp, Message, RuntimeSettings, TaskKind, TaskRegistry, run_ingest};

use support::{Harness, NullRegistrar, quiet_settings, wait_for};

const LIMIT: Duration = Duration::from_secs(10);

#[tokio::test]
async fn compact_message_trims_metadata_and_disk_stats() {
    let harness = Harness::new(16).await.unwrap();
    let settings = RuntimeSettings {
        compaction_interval: Duration::from_secs(1),
        ..quiet_settings()
    };
    let ctx = harness.context(Arc::new(NullRegistrar), settings);

    let stale = Utc::now() - chrono::Duration::seconds(2);
    let metadata = harness.db.metadata();
    for i in 0..100 {
        metadata
            .insert(&NewMetadata {
                full_path: format!("/old/{i}"),
                size_bytes: 1,
                file_mode: 0o644,
                is_directory: false,
                created_at: stale,
                modified_at: stale,
            })
            .await
            .unwrap();
    }
    let disk = harness.db.disk_stats();
    for i in 0..12 {
        disk.insert(
            &DiskUsage::from_parts(100, i, i),
            stale + chrono::Duration::milliseconds(i as i64),
        )
        .await
        .unwrap();
    }

    let registry = TaskRegistry::init(&ctx, &[TaskKind::Metadata, TaskKind::Fs])
        .await
        .unwrap();
    let cancel = CancellationToken::new();
    let mut running = registry.run(&cancel);

    harness.broadcaster.broadcast(Message::compact()).await;

    wait_for(LIMIT, || {
        let (metadata, disk) = (metadata.clone(), disk.clone());
        async move {
            let rows = metadata.list_all().await.unwrap();
            let disk_rows = disk.list_all().await.unwrap();
            !rows.iter().any(|row| row.full_path.starts_with("/old/")) && disk_rows.len() <= 5
        }
    })
    .await
    .unwrap();

    cancel.cancel();
    while running.join_next().await.is_some() {}
}

#[tokio::test]
async fn compaction_task_publishes_on_its_interval() {
    let harness = Harness::new(16).await.unwrap();
    let settings = RuntimeSettings {
        compaction_interval: Duration::from_millis(100),
        ..quiet_settings()
    };
    let ctx = harness.context(Arc::new(NullRegistrar), settings);
    let mut observer = harness.broadcaster.subscribe("observer").await.unwrap();

    let registry = TaskRegistry::init(&ctx, &[TaskKind::Compaction]).await.unwrap();
    let cancel = CancellationToken::new();
    let mut running = registry.run(&cancel);

    let msg = tokio::time::timeout(LIMIT, observer.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(msg, Message::compact());

    cancel.cancel();
    while running.join_next().await.is_some() {}
}

#[tokio::test]
async fn concurrent_workers_execute_a_proc_exactly_once() {
    let harness = Harness::new(16).await.unwrap();
    let repo = harness.db.procs();

    let spec = ProcRequest {
        command: "mkdir".into(),
        args: [("dirname".to_string(), vec!["x".to_string()])].into(),
    }
    .into_spec(&harness.root())
    .unwrap();
    let row = repo
        .insert(&spec.command, &spec.args_string(), Utc::now())
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let (first, second) = tokio::join!(
        run_proc_worker(&repo, row.clone(), &cancel),
        run_proc_worker(&repo, row.clone(), &cancel),
    );
    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| matches!(outcome, WorkerOutcome::AlreadyClaimed));
    assert_eq!(
        outcomes,
        vec![
            WorkerOutcome::Executed { success: true },
            WorkerOutcome::AlreadyClaimed
        ]
    );

    let results = repo.results_for(row.id).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].created_at, row.created_at);
    assert!(harness.root().join("x").is_dir());
}

#[tokio::test]
async fn two_proc_tasks_share_one_queue() {
    let harness = Harness::new(16).await.unwrap();
    let settings = RuntimeSettings {
        proc_poll_interval: Duration::from_millis(50),
        ..quiet_settings()
    };
    let ctx = harness.context(Arc::new(NullRegistrar), settings);
    let repo = harness.db.procs();

    for i in 0..5 {
        let target = harness.root().join(format!("dir-{i}"));
        repo.insert("mkdir", &target.display().to_string(), Utc::now())
            .await
            .unwrap();
    }

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for name in ["ProcTask-a", "ProcTask-b"] {
        let sub = harness.broadcaster.subscribe(name).await.unwrap();
        let task: Box<dyn Task> = Box::new(ProcTask::new(&ctx, sub));
        handles.push(tokio::spawn(task.run(cancel.child_token())));
    }

    wait_for(LIMIT, || {
        let repo = repo.clone();
        async move { repo.list_results().await.unwrap().len() == 5 }
    })
    .await
    .unwrap();
    // Give a late duplicate a chance to show up.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(repo.list_results().await.unwrap().len(), 5);
    assert!(repo.pending().await.unwrap().is_empty());
    for i in 0..5 {
        assert!(harness.root().join(format!("dir-{i}")).is_dir());
    }

    cancel.cancel();
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test]
async fn failing_proc_records_error_in_stderr() {
    let harness = Harness::new(16).await.unwrap();
    let repo = harness.db.procs();
    let blocker = harness.root().join("blocker");
    std::fs::write(&blocker, b"file").unwrap();

    // mkdir over an existing file fails.
    let row = repo
        .insert("mkdir", &blocker.display().to_string(), Utc::now())
        .await
        .unwrap();
    let outcome = run_proc_worker(&repo, row.clone(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, WorkerOutcome::Executed { success: false });

    let results = repo.results_for(row.id).await.unwrap();
    assert!(results[0].stderr.contains("exited"), "{}", results[0].stderr);
}

#[tokio::test]
async fn new_subdirectories_join_the_watch_set() {
    let harness = Harness::new(256).await.unwrap();
    let (watcher, streams) = FsWatcher::new().unwrap();
    let watcher = Arc::new(watcher);
    let settings = RuntimeSettings {
        metadata_update_interval: Duration::from_millis(100),
        ..quiet_settings()
    };
    let ctx = harness.context(watcher.clone(), settings);
    let mut observer = harness.broadcaster.subscribe("observer").await.unwrap();

    let registry = TaskRegistry::init(&ctx, &[TaskKind::Metadata]).await.unwrap();
    let cancel = CancellationToken::new();
    let mut running = registry.run(&cancel);
    let ingest = tokio::spawn(run_ingest(
        cancel.child_token(),
        streams,
        Arc::clone(&harness.broadcaster),
    ));
    watcher.add(&harness.root()).unwrap();

    let a = harness.root().join("a");
    std::fs::create_dir(&a).unwrap();
    let a_name = a.to_string_lossy().into_owned();
    expect_create(&mut observer, &a_name).await;

    wait_for(LIMIT, || {
        let watched = watcher.watched_paths().contains(&a);
        async move { watched }
    })
    .await
    .unwrap();
    let metadata = harness.db.metadata();
    wait_for(LIMIT, || {
        let (metadata, a_name) = (metadata.clone(), a_name.clone());
        async move { !metadata.rows_for_path(&a_name).await.unwrap().is_empty() }
    })
    .await
    .unwrap();

    let b = a.join("b");
    std::fs::create_dir(&b).unwrap();
    expect_create(&mut observer, &b.to_string_lossy()).await;

    cancel.cancel();
    watcher.close();
    while running.join_next().await.is_some() {}
    ingest.await.unwrap();
}

async fn expect_create(observer: &mut fsd_core::Subscription, path: &str) {
    let found = tokio::time::timeout(LIMIT, async {
        while let Some(msg) = observer.recv().await {
            if msg.operation == FsdOp::Create && msg.name == path {
                return true;
            }
        }
        false
    })
    .await;
    assert!(matches!(found, Ok(true)), "no Create for {path}");
}

#[tokio::test]
async fn recreated_directory_is_watched_again() {
    let harness = Harness::new(256).await.unwrap();
    let (watcher, streams) = FsWatcher::new().unwrap();
    let watcher = Arc::new(watcher);
    let ctx = harness.context(watcher.clone(), quiet_settings());
    let mut observer = harness.broadcaster.subscribe("observer").await.unwrap();

    let registry = TaskRegistry::init(&ctx, &[TaskKind::Metadata]).await.unwrap();
    let cancel = CancellationToken::new();
    let mut running = registry.run(&cancel);
    let ingest = tokio::spawn(run_ingest(
        cancel.child_token(),
        streams,
        Arc::clone(&harness.broadcaster),
    ));
    watcher.add(&harness.root()).unwrap();

    let a = harness.root().join("a");
    std::fs::create_dir(&a).unwrap();
    expect_create(&mut observer, &a.to_string_lossy()).await;
    wait_for(LIMIT, || {
        let watched = watcher.watched_paths().contains(&a);
        async move { watched }
    })
    .await
    .unwrap();

    std::fs::remove_dir(&a).unwrap();
    wait_for(LIMIT, || {
        let watched = watcher.watched_paths().contains(&a);
        async move { !watched }
    })
    .await
    .unwrap();

    std::fs::create_dir(&a).unwrap();
    expect_create(&mut observer, &a.to_string_lossy()).await;
    wait_for(LIMIT, || {
        let watched = watcher.watched_paths().contains(&a);
        async move { watched }
    })
    .await
    .unwrap();

    let b = a.join("b");
    std::fs::create_dir(&b).unwrap();
    expect_create(&mut observer, &b.to_string_lossy()).await;

    cancel.cancel();
    watcher.close();
    while running.join_next().await.is_some() {}
    ingest.await.unwrap();
}

#[tokio::test]
async fn remove_message_drops_rows_for_the_path() {
    let harness = Harness::new(16).await.unwrap();
    let ctx = harness.context(Arc::new(NullRegistrar), quiet_settings());
    let metadata = harness.db.metadata();

    let gone = harness.root().join("gone").to_string_lossy().into_owned();
    let kept = harness.root().join("kept").to_string_lossy().into_owned();
    for path in [&gone, &gone, &kept] {
        let now = Utc::now();
        metadata
            .insert(&NewMetadata {
                full_path: path.clone(),
                size_bytes: 3,
                file_mode: 0o644,
                is_directory: false,
                created_at: now,
                modified_at: now,
            })
            .await
            .unwrap();
    }

    let registry = TaskRegistry::init(&ctx, &[TaskKind::Metadata]).await.unwrap();
    let cancel = CancellationToken::new();
    let mut running = registry.run(&cancel);

    harness
        .broadcaster
        .broadcast(Message::new(gone.clone(), FsdOp::Remove))
        .await;

    wait_for(LIMIT, || {
        let (metadata, gone) = (metadata.clone(), gone.clone());
        async move { metadata.rows_for_path(&gone).await.unwrap().is_empty() }
    })
    .await
    .unwrap();
    assert_eq!(metadata.rows_for_path(&kept).await.unwrap().len(), 1);

    cancel.cancel();
    while running.join_next().await.is_some() {}
}

#[tokio::test]
async fn slow_snapshots_skip_ticks_and_commit_whole_trees() {
    const DIRS: usize = 30;
    const FILES: usize = 100;

    let harness = Harness::new(16).await.unwrap();
    let root = harness.root();
    for d in 0..DIRS {
        let dir = root.join(format!("d{d}"));
        std::fs::create_dir(&dir).unwrap();
        for f in 0..FILES {
            std::fs::write(dir.join(format!("f{f}")), b"x").unwrap();
        }
    }
    let entries = 1 + DIRS + DIRS * FILES;

    let interval = Duration::from_millis(10);
    let settings = RuntimeSettings {
        metadata_update_interval: interval,
        ..quiet_settings()
    };
    let ctx = harness.context(Arc::new(NullRegistrar), settings);
    let registry = TaskRegistry::init(&ctx, &[TaskKind::Metadata]).await.unwrap();
    let cancel = CancellationToken::new();
    let started = tokio::time::Instant::now();
    let mut running = registry.run(&cancel);

    let metadata = harness.db.metadata();
    wait_for(Duration::from_secs(60), || {
        let metadata = metadata.clone();
        async move { metadata.count().await.unwrap() >= 3 * entries as i64 }
    })
    .await
    .unwrap();
    let elapsed = started.elapsed();
    cancel.cancel();
    while running.join_next().await.is_some() {}

    // Every walk yields the root first, so it opens a new snapshot.
    let root_name = root.to_string_lossy().into_owned();
    let mut rows = metadata.list_all().await.unwrap();
    rows.sort_by_key(|row| row.id);
    let mut snapshots: Vec<Vec<_>> = Vec::new();
    for row in rows {
        if row.full_path == root_name {
            snapshots.push(Vec::new());
        }
        snapshots
            .last_mut()
            .expect("snapshot rows start with the root")
            .push(row);
    }

    assert!(snapshots.len() >= 3);
    for snapshot in &snapshots {
        assert_eq!(snapshot.len(), entries, "partial snapshot committed");
    }

    let ticks = elapsed.as_millis() / interval.as_millis();
    assert!(
        (snapshots.len() as u128) < ticks,
        "{} snapshots for {} ticks",
        snapshots.len(),
        ticks
    );

    for pair in snapshots.windows(2) {
        let first = pair[0].iter().map(|row| row.created_at).min().unwrap();
        let last = pair[0].iter().map(|row| row.created_at).max().unwrap();
        let next = pair[1].iter().map(|row| row.created_at).min().unwrap();
        assert!(next >= last, "snapshots overlapped");
        // The root is sampled first in each walk.
        assert!(pair[1][0].created_at - pair[0][0].created_at >= last - first);
    }
}

#[tokio::test]
async fn cancellation_stops_every_task_and_unsubscribes() {
    let harness = Harness::new(16).await.unwrap();
    let settings = RuntimeSettings {
        metadata_update_interval: Duration::from_millis(50),
        compaction_interval: Duration::from_millis(50),
        disk_stats_interval: Duration::from_millis(50),
        disk_stats_retain: 5,
        proc_poll_interval: Duration::from_millis(50),
    };
    let ctx = harness.context(Arc::new(NullRegistrar), settings);

    let registry = TaskRegistry::init(&ctx, &TaskKind::ALL).await.unwrap();
    assert_eq!(
        registry.names(),
        vec!["FsTask", "MetadataTask", "CompactionTask", "ProcTask"]
    );
    let cancel = CancellationToken::new();
    let mut running = registry.run(&cancel);

    tokio::time::sleep(Duration::from_millis(300)).await;
    cancel.cancel();

    let mut stopped = Vec::new();
    tokio::time::timeout(LIMIT, async {
        while let Some(joined) = running.join_next().await {
            stopped.push(joined.unwrap());
        }
    })
    .await
    .unwrap();
    stopped.sort();
    assert_eq!(stopped, TaskKind::ALL.to_vec());
    assert!(harness.broadcaster.subscriber_names().await.is_empty());
    assert!(!harness.db.disk_stats().list_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn registry_rejects_a_name_already_on_the_bus() {
    let harness = Harness::new(4).await.unwrap();
    let ctx = harness.context(Arc::new(NullRegistrar), quiet_settings());
    let _squatter = harness.broadcaster.subscribe("FsTask").await.unwrap();
    assert!(TaskRegistry::init(&ctx, &[TaskKind::Fs]).await.is_err());
}
