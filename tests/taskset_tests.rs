//! Task set tests against scripted job servers.
//!
//! These tests cover the submit-then-wait cycle: handle assignment, routing
//! of progress packets, retries, coalescing and the wait deadline.


use std::time::{Duration, Instant};

use gearman_lite::protocol::PacketKind;
use gearman_lite::registry::ServerPool;
use gearman_lite::taskset::TaskSet;
use gearman_lite::{Job, JobState, Task};
use test_harness::{test_config, FakeJobServer, Reply};

/// Test 1: A single job completes and its connection goes back to the pool
#[tokio::test]
async fn test_single_job_completes() {
    let server = FakeJobServer::completing("olleh").await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut job = Job::new("reverse", "hello");

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut job).await.expect("job should be accepted");
    assert_eq!(set.pending_count(), 1);
    assert!(!set.is_awaiting_handle());

    let success = set.wait(Some(Duration::from_secs(5))).await.unwrap();
    assert!(success, "Job should complete successfully");
    assert_eq!(set.pending_count(), 0);
    assert_eq!(set.finished().len(), 1);
    drop(set);

    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.result.as_deref(), Some(&b"olleh"[..]));
    assert!(job.completed_at.is_some());
    assert_eq!(
        pool.idle_count(&server.addr),
        1,
        "Connection should be released to the pool"
    );
    assert_eq!(pool.leased_count(), 0);

    let submissions = server.submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].function, "reverse");
    assert_eq!(submissions[0].argument, b"hello");
}

/// Test 2: Status, data and warning packets reach the job before completion
#[tokio::test]
async fn test_progress_packets_are_routed() {
    let server = FakeJobServer::start(|_, _| {
        vec![
            Reply::Status(1, 2),
            Reply::Data("part-".to_string()),
            Reply::Warning("slow disk".to_string()),
            Reply::Data("two".to_string()),
            Reply::Status(2, 2),
            Reply::complete("done"),
        ]
    })
    .await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut job = Job::new("index", "doc-1");

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut job).await.unwrap();
    assert!(set.wait(Some(Duration::from_secs(5))).await.unwrap());
    drop(set);

    assert_eq!(job.status, Some((2, 2)));
    assert_eq!(job.data, b"part-two");
    assert_eq!(job.warnings, vec![b"slow disk".to_vec()]);
    assert_eq!(job.result.as_deref(), Some(&b"done"[..]));
}

/// Test 3: An exception followed by failure leaves the job failed
#[tokio::test]
async fn test_exception_then_failure() {
    let server = FakeJobServer::start(|_, _| {
        vec![Reply::Exception("division by zero".to_string()), Reply::Fail]
    })
    .await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut job = Job::new("divide", "1/0");

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut job).await.unwrap();
    let success = set.wait(Some(Duration::from_secs(5))).await.unwrap();
    drop(set);

    assert!(!success, "A failed job should make the batch unsuccessful");
    assert_eq!(job.state, JobState::Failed);
    assert_eq!(job.exception.as_deref(), Some(&b"division by zero"[..]));
    assert!(job.result.is_none());
}

/// Test 4: A background job is finished as soon as it holds a handle
#[tokio::test]
async fn test_background_job_finishes_on_handle() {
    let server = FakeJobServer::start(|_, _| Vec::new()).await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut job = Job::new("send_email", "to=ops").background();

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut job).await.unwrap();
    assert_eq!(set.pending_count(), 0);
    assert_eq!(set.finished().len(), 1);

    let start = Instant::now();
    assert!(set.wait(None).await.unwrap());
    assert!(start.elapsed() < Duration::from_secs(1));
    drop(set);

    assert_eq!(job.state, JobState::Queued);
    assert!(job.is_successful());
    assert_eq!(job.handle.as_deref(), Some("H:test:1"));
    assert_eq!(server.submissions()[0].kind, PacketKind::SubmitJobBg);
}

/// Test 5: A server that drops the connection after accepting the job
/// leaves the job pending until the deadline
#[tokio::test]
async fn test_disconnect_after_handle_times_out() {
    let server = FakeJobServer::start(|_, _| vec![Reply::Disconnect]).await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut job = Job::new("reverse", "hello");

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut job).await.unwrap();

    let deadline = Duration::from_millis(500);
    let start = Instant::now();
    let success = set.wait(Some(deadline)).await.unwrap();
    let elapsed = start.elapsed();

    assert!(!success, "Wait should report the timeout");
    assert!(
        elapsed >= deadline,
        "Wait should run until the deadline, returned after {:?}",
        elapsed
    );
    assert!(elapsed < Duration::from_secs(3));
    assert_eq!(set.pending_count(), 1, "Job should stay in progress");
    assert_eq!(set.finished().len(), 0);
    assert_eq!(set.connection_count(), 0);
    drop(set);

    assert_eq!(job.state, JobState::Running);
    assert!(pool.is_marked_bad(&server.addr));
}

/// Test 6: A slow job is still running when the deadline passes
#[tokio::test]
async fn test_wait_deadline_with_slow_job() {
    let server =
        FakeJobServer::start(|_, _| vec![Reply::Delay(5_000), Reply::complete("late")]).await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut job = Job::new("slow", "x");

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut job).await.unwrap();

    let start = Instant::now();
    let success = set.wait(Some(Duration::from_millis(300))).await.unwrap();
    assert!(!success);
    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(set.pending_count(), 1);
    assert_eq!(set.connection_count(), 0, "Timeout should close connections");
    drop(set);

    assert_eq!(job.state, JobState::Running);
    assert_eq!(pool.idle_count(&server.addr), 0);
}

/// Test 7: A job that fails every attempt is resubmitted once, then fails
#[tokio::test]
async fn test_retry_exhausted() {
    let server = FakeJobServer::start(|_, _| vec![Reply::Fail]).await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut job = Job::new("flaky", "x").with_retries(1);

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut job).await.unwrap();
    let success = set.wait(Some(Duration::from_secs(5))).await.unwrap();
    drop(set);

    assert!(!success);
    assert_eq!(server.submission_count(), 2, "One resubmission expected");
    assert_eq!(job.retries_done, 1);
    assert_eq!(job.state, JobState::Failed);
}

/// Test 8: A retried job succeeds on its second attempt
#[tokio::test]
async fn test_retry_then_success() {
    let server = FakeJobServer::start(|_, seen| {
        if seen == 0 {
            vec![Reply::Fail]
        } else {
            vec![Reply::complete("second time")]
        }
    })
    .await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut job = Job::new("flaky", "x").with_retries(3);

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut job).await.unwrap();
    assert!(set.wait(Some(Duration::from_secs(5))).await.unwrap());
    drop(set);

    let submissions = server.submissions();
    assert_eq!(submissions.len(), 2);
    assert_ne!(submissions[0].handle, submissions[1].handle);
    assert_eq!(job.retries_done, 1);
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.handle, submissions[1].handle);
}

/// Test 9: Jobs sharing a unique id share one handle and one result
#[tokio::test]
async fn test_coalesced_jobs_share_result() {
    let server =
        FakeJobServer::start(|_, _| vec![Reply::Delay(200), Reply::complete("shared")]).await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut first = Job::new("thumbnail", "img-7").with_unique("img-7");
    let mut second = Job::new("thumbnail", "img-7").with_unique("img-7");

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut first).await.unwrap();
    set.add_task(&mut second).await.unwrap();

    assert_eq!(set.handles().count(), 1, "Both jobs should share a handle");
    assert_eq!(set.pending_count(), 2);
    assert!(set.wait(Some(Duration::from_secs(5))).await.unwrap());
    drop(set);

    assert_eq!(first.handle, second.handle);
    assert_eq!(first.result.as_deref(), Some(&b"shared"[..]));
    assert_eq!(second.result.as_deref(), Some(&b"shared"[..]));
    assert_eq!(server.submission_count(), 2);
}

/// Test 10: Completions arriving out of order reach the right jobs
#[tokio::test]
async fn test_interleaved_completions() {
    let server = FakeJobServer::start(|submission, _| {
        let delay = match submission.argument.as_slice() {
            b"a" => 300,
            b"b" => 50,
            _ => 150,
        };
        let result = format!("done-{}", String::from_utf8_lossy(&submission.argument));
        vec![Reply::Delay(delay), Reply::Complete(result)]
    })
    .await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut jobs = vec![
        Job::new("work", "a"),
        Job::new("work", "b"),
        Job::new("work", "c"),
    ];

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_tasks(jobs.iter_mut()).await.unwrap();
    assert_eq!(set.pending_count(), 3);
    assert_eq!(set.connection_count(), 1, "All jobs share one connection");
    assert!(set.wait(Some(Duration::from_secs(5))).await.unwrap());
    drop(set);

    for job in &jobs {
        let expected = format!("done-{}", String::from_utf8_lossy(&job.argument));
        assert_eq!(job.result.as_deref(), Some(expected.as_bytes()));
    }
}

/// Test 11: Waiting on an empty set succeeds immediately
#[tokio::test]
async fn test_empty_wait() {
    let config = test_config(&["127.0.0.1:1"]);
    let mut pool = ServerPool::new(&config);

    let mut set: TaskSet<'_, ServerPool, Job> = TaskSet::new(&mut pool, &config);
    assert!(set.wait(Some(Duration::from_millis(10))).await.unwrap());
    assert!(set.wait(None).await.unwrap());
}

/// Test 12: Tasks can be handed back after the wait
#[tokio::test]
async fn test_into_tasks_after_timeout() {
    let server = FakeJobServer::start(|submission, _| {
        if submission.argument == b"fast" {
            vec![Reply::complete("ok")]
        } else {
            vec![Reply::Delay(5_000), Reply::complete("late")]
        }
    })
    .await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(Job::new("work", "fast")).await.unwrap();
    set.add_task(Job::new("work", "slow")).await.unwrap();
    assert!(!set.wait(Some(Duration::from_millis(400))).await.unwrap());

    let (finished, pending) = set.into_tasks();
    assert_eq!(finished.len(), 1);
    assert_eq!(finished[0].argument, b"fast");
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].state, JobState::Running);
}

/// Test 13: A completion that arrives while a later job waits for its
/// handle is routed to the earlier job
#[tokio::test]
async fn test_completion_routed_during_submission() {
    let server = FakeJobServer::start(|submission, _| {
        if submission.argument == b"first" {
            vec![Reply::Delay(100), Reply::complete("one")]
        } else {
            vec![Reply::HoldCreated(400), Reply::complete("two")]
        }
    })
    .await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut first = Job::new("work", "first");
    let mut second = Job::new("work", "second");

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut first).await.unwrap();
    set.add_task(&mut second).await.unwrap();

    assert_eq!(
        set.finished().len(),
        1,
        "First job should finish while the second waits for its handle"
    );
    assert_eq!(set.finished()[0].result.as_deref(), Some(&b"one"[..]));
    assert_eq!(set.pending_count(), 1);
    assert!(set.wait(Some(Duration::from_secs(5))).await.unwrap());
    drop(set);

    assert_eq!(first.state, JobState::Completed);
    assert_eq!(second.result.as_deref(), Some(&b"two"[..]));
}

/// Test 14: A failure that arrives while a later job waits for its handle
/// is resubmitted once that handle is assigned
#[tokio::test]
async fn test_failure_during_submission_is_resubmitted() {
    let server = FakeJobServer::start(|_, seen| match seen {
        0 => vec![Reply::Delay(100), Reply::Fail],
        1 => vec![Reply::HoldCreated(400), Reply::complete("two")],
        _ => vec![Reply::complete("again")],
    })
    .await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut first = Job::new("work", "first").with_retries(1);
    let mut second = Job::new("work", "second");

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut first).await.unwrap();
    set.add_task(&mut second).await.unwrap();

    assert_eq!(
        server.submission_count(),
        3,
        "First job should be resubmitted during the second add"
    );
    assert!(!set.is_awaiting_handle());
    assert!(set.wait(Some(Duration::from_secs(5))).await.unwrap());
    drop(set);

    let submissions = server.submissions();
    assert_eq!(submissions[2].argument, b"first");
    assert_eq!(first.retries_done, 1);
    assert_eq!(first.result.as_deref(), Some(&b"again"[..]));
    assert_eq!(second.result.as_deref(), Some(&b"two"[..]));
}

/// Test 15: Packets that cannot be routed are dropped and the wait goes on
#[tokio::test]
async fn test_unroutable_packets_do_not_stop_wait() {
    let stray = |kind: PacketKind, args: &[&str]| {
        Reply::Raw(kind, args.iter().map(|arg| arg.to_string()).collect())
    };
    let server = FakeJobServer::start(move |_, _| {
        vec![
            Reply::Delay(50),
            stray(PacketKind::WorkData, &["H:test:999", "junk"]),
            stray(PacketKind::WorkStatus, &["H:test:999", "1", "2"]),
            stray(PacketKind::JobCreated, &["H:test:1000"]),
            Reply::complete("ok"),
        ]
    })
    .await;
    let config = test_config(&[&server.addr]);
    let mut pool = ServerPool::new(&config);
    let mut job = Job::new("work", "x");

    let mut set = TaskSet::new(&mut pool, &config);
    set.add_task(&mut job).await.unwrap();
    let success = set
        .wait(Some(Duration::from_secs(5)))
        .await
        .expect("Unroutable packets should not fail the wait");
    assert!(success);
    assert_eq!(set.connection_count(), 0);
    drop(set);

    assert_eq!(job.state, JobState::Completed);
    assert!(job.data.is_empty());
    assert!(job.status.is_none());
    assert!(!pool.is_marked_bad(&server.addr), "Server should stay usable");
    assert_eq!(pool.idle_count(&server.addr), 1);
}
