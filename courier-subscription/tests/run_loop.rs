//! Run loop behavior against a scripted log client.
//!
//! Covers cursor movement, acknowledgement accounting, error classification
//! and the cancellation/completion contract.

use std::sync::Arc;
use std::time::Duration;

use courier_log::{LogError, Message, MessageId, StartId, StreamMessages};
use courier_subscription::{Subscription, SubscriptionConfig, SubscriptionHandle};
use courier_testkit::{
    event_fields, invalid_fields, message, sample_event, wait_until, LogCapture,
    RecordingDispatcher, Result, ScriptedLog,
};
use tokio_util::sync::CancellationToken;
use tracing::Level;

const STREAM: &str = "test-stream";

fn valid(position: &str, event_id: &str) -> Result<Message> {
    message(position, event_fields(&sample_event(event_id))?)
}

fn after(position: &str) -> StartId {
    StartId::After(position.parse().unwrap())
}

fn id(position: &str) -> MessageId {
    position.parse().unwrap()
}

fn start(
    config: SubscriptionConfig,
    log: &Arc<ScriptedLog>,
    dispatcher: &RecordingDispatcher,
) -> SubscriptionHandle {
    Subscription::new(config, Arc::clone(log), dispatcher.clone(), CancellationToken::new())
        .expect("valid config")
        .start()
}

async fn shutdown(handle: &SubscriptionHandle) {
    tokio::time::timeout(Duration::from_secs(2), handle.shutdown())
        .await
        .expect("Subscription did not stop");
}

#[tokio::test]
async fn test_backlog_drains_in_order_then_switches_to_live_tail() -> Result<()> {
    let log = Arc::new(ScriptedLog::new());
    log.push_messages(STREAM, vec![valid("1", "e-1")?]);
    log.push_messages(STREAM, vec![valid("2", "e-2")?]);
    log.push_messages(STREAM, vec![valid("3", "e-3")?]);
    log.push_empty(STREAM);
    // Live tail: messages no longer move the cursor, empty reads do not flip it back
    log.push_messages(STREAM, vec![valid("4", "e-4")?]);
    log.push_empty(STREAM);
    let dispatcher = RecordingDispatcher::new();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);

    wait_until("seventh read", || log.read_count() == 7).await?;
    wait_until("four acks", || log.acks().len() == 4).await?;
    shutdown(&handle).await;

    assert_eq!(
        log.read_starts(),
        vec![
            after("0"),
            after("1"),
            after("2"),
            after("3"),
            StartId::NewOnly,
            StartId::NewOnly,
            StartId::NewOnly,
        ]
    );

    let mut acks = log.acks();
    acks.sort();
    assert_eq!(acks, vec![id("1"), id("2"), id("3"), id("4")]);

    let mut events = dispatcher.events();
    events.sort_by(|a, b| a.id.cmp(&b.id));
    let tagged: Vec<(String, Option<String>)> = events
        .iter()
        .map(|e| (e.id.clone(), e.backend_id().map(str::to_string)))
        .collect();
    assert_eq!(
        tagged,
        vec![
            ("e-1".to_string(), Some("1-0".to_string())),
            ("e-2".to_string(), Some("2-0".to_string())),
            ("e-3".to_string(), Some("3-0".to_string())),
            ("e-4".to_string(), Some("4-0".to_string())),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_read_requests_one_message_for_configured_identity() -> Result<()> {
    let log = Arc::new(ScriptedLog::new());
    let dispatcher = RecordingDispatcher::new();
    let config = SubscriptionConfig::test()
        .with_consumer("worker-7")
        .with_block(Duration::from_secs(90));

    let handle = start(config, &log, &dispatcher);
    wait_until("first read", || log.read_count() == 1).await?;
    shutdown(&handle).await;

    let request = &log.reads()[0];
    assert_eq!(request.stream, STREAM);
    assert_eq!(request.group, "test-group");
    assert_eq!(request.consumer, "worker-7");
    assert_eq!(request.count, 1);
    assert_eq!(request.block, Some(Duration::from_secs(90)));
    assert!(!request.no_ack);
    Ok(())
}

#[tokio::test]
async fn test_invalid_messages_are_acknowledged_and_not_dispatched() -> Result<()> {
    let capture = LogCapture::new();
    let _guard = capture.install();

    let log = Arc::new(ScriptedLog::new());
    log.push_messages(STREAM, vec![message("1", invalid_fields("{not json"))?]);
    log.push_messages(
        STREAM,
        vec![message("2", [("other".to_string(), "x".to_string())].into())?],
    );
    log.push_messages(
        STREAM,
        vec![message(
            "3",
            invalid_fields(r#"{"specversion":"1.0","id":"","source":"s","type":"t"}"#),
        )?],
    );
    log.push_messages(STREAM, vec![valid("4", "e-4")?]);
    log.push_empty(STREAM);
    let dispatcher = RecordingDispatcher::new();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("all acks", || log.acks().len() == 4).await?;
    shutdown(&handle).await;

    // Invalid messages are acknowledged inline, in read order
    assert_eq!(&log.acks()[..3], &[id("1"), id("2"), id("3")]);
    assert_eq!(log.acks()[3], id("4"));
    assert_eq!(dispatcher.event_ids(), vec!["e-4"]);

    let warnings = capture.matching("Removing invalid message from log");
    assert_eq!(warnings.len(), 3);
    assert!(warnings.iter().all(|w| w.level == Level::WARN));
    assert_eq!(warnings[0].fields["message_id"], "1-0");
    Ok(())
}

#[tokio::test]
async fn test_unrecognized_fields_are_logged_at_debug_and_ignored() -> Result<()> {
    let capture = LogCapture::new();
    let _guard = capture.install();

    let mut fields = event_fields(&sample_event("e-1"))?;
    fields.insert("origin".to_string(), "legacy-producer".to_string());
    let log = Arc::new(ScriptedLog::new());
    log.push_messages(STREAM, vec![message("1", fields)?]);
    let dispatcher = RecordingDispatcher::new();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("ack", || log.acks().len() == 1).await?;
    shutdown(&handle).await;

    assert_eq!(dispatcher.event_ids(), vec!["e-1"]);
    let ignored = capture.matching("Ignoring unexpected field in message");
    assert_eq!(ignored.len(), 1);
    assert_eq!(ignored[0].level, Level::DEBUG);
    assert_eq!(ignored[0].fields["field"], "origin");
    assert_eq!(ignored[0].fields["message_id"], "1-0");
    assert!(capture.at_level(Level::WARN).is_empty());
    Ok(())
}

#[tokio::test]
async fn test_benign_read_errors_are_silent_and_keep_the_cursor() -> Result<()> {
    let capture = LogCapture::new();
    let _guard = capture.install();

    let log = Arc::new(ScriptedLog::new());
    log.push_error(LogError::Timeout);
    log.push_error(LogError::Canceled);
    log.push_error(LogError::Timeout);
    let dispatcher = RecordingDispatcher::new();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("fourth read", || log.read_count() == 4).await?;
    shutdown(&handle).await;

    assert!(capture.at_level(Level::ERROR).is_empty());
    assert!(capture.at_level(Level::WARN).is_empty());
    assert!(capture.matching("Error reading").is_empty());
    assert!(log.read_starts().iter().all(|start| *start == after("0")));
    Ok(())
}

#[tokio::test]
async fn test_other_read_errors_are_logged_and_retried() -> Result<()> {
    let capture = LogCapture::new();
    let _guard = capture.install();

    let log = Arc::new(ScriptedLog::new());
    log.push_error(LogError::Backend("connection reset".to_string()));
    log.push_error(LogError::NoGroup { stream: STREAM.to_string(), group: "g".to_string() });
    log.push_messages(STREAM, vec![valid("1", "e-1")?]);
    let dispatcher = RecordingDispatcher::new();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("ack after errors", || log.acks().len() == 1).await?;
    shutdown(&handle).await;

    let errors = capture.matching("Error reading events from consumer group");
    assert_eq!(errors.len(), 2);
    assert!(errors.iter().all(|e| e.level == Level::ERROR));
    assert_eq!(errors[0].fields["error"], "Backend error: connection reset");
    assert_eq!(dispatcher.event_ids(), vec!["e-1"]);
    Ok(())
}

#[tokio::test]
async fn test_unexpected_stream_count_is_logged_and_skipped() -> Result<()> {
    let capture = LogCapture::new();
    let _guard = capture.install();

    let log = Arc::new(ScriptedLog::new());
    log.push_read(Ok(Vec::new()));
    log.push_read(Ok(vec![
        StreamMessages { stream: STREAM.to_string(), messages: vec![valid("1", "e-1")?] },
        StreamMessages { stream: "other".to_string(), messages: Vec::new() },
    ]));
    log.push_messages(STREAM, vec![valid("2", "e-2")?]);
    log.push_empty(STREAM);
    let dispatcher = RecordingDispatcher::new();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("fifth read", || log.read_count() == 5).await?;
    wait_until("ack", || log.acks().len() == 1).await?;
    shutdown(&handle).await;

    assert_eq!(capture.matching("Unexpected number of streams read").len(), 2);
    // Nothing from the rejected reads was dispatched or acknowledged
    assert_eq!(dispatcher.event_ids(), vec!["e-2"]);
    assert_eq!(log.acks(), vec![id("2")]);
    assert_eq!(
        log.read_starts(),
        vec![after("0"), after("0"), after("0"), after("2"), StartId::NewOnly]
    );
    Ok(())
}

#[tokio::test]
async fn test_ack_happens_after_dispatch_returns() -> Result<()> {
    let log = Arc::new(ScriptedLog::new());
    log.push_messages(STREAM, vec![valid("1", "e-1")?]);
    let dispatcher = RecordingDispatcher::gated();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("dispatch started", || dispatcher.count() == 1).await?;

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(log.acks().is_empty(), "Acknowledged before dispatch returned");

    dispatcher.release(1);
    wait_until("ack", || log.acks() == vec![id("1")]).await?;
    shutdown(&handle).await;
    Ok(())
}

#[tokio::test]
async fn test_reading_continues_while_dispatch_is_blocked() -> Result<()> {
    let log = Arc::new(ScriptedLog::new());
    for (position, event_id) in [("1", "e-1"), ("2", "e-2"), ("3", "e-3")] {
        log.push_messages(STREAM, vec![valid(position, event_id)?]);
    }
    let dispatcher = RecordingDispatcher::gated();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);

    // All three dispatches run at once; none has returned
    wait_until("three dispatches", || dispatcher.in_flight() == 3).await?;
    assert!(log.acks().is_empty());

    dispatcher.release(3);
    wait_until("three acks", || log.acks().len() == 3).await?;
    shutdown(&handle).await;
    Ok(())
}

#[tokio::test]
async fn test_ack_failure_is_logged_once_and_not_retried() -> Result<()> {
    let capture = LogCapture::new();
    let _guard = capture.install();

    let log = Arc::new(ScriptedLog::new());
    log.fail_ack_for(id("1"));
    log.push_messages(STREAM, vec![valid("1", "e-1")?]);
    log.push_messages(STREAM, vec![valid("2", "e-2")?]);
    let dispatcher = RecordingDispatcher::new();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("two acks", || log.acks().len() == 2).await?;
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown(&handle).await;

    let mut acks = log.acks();
    acks.sort();
    assert_eq!(acks, vec![id("1"), id("2")]);

    let failures = capture.matching("Could not acknowledge message");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].level, Level::ERROR);
    assert_eq!(failures[0].fields["message_id"], "1-0");
    assert_eq!(failures[0].fields["event_id"], "e-1");
    Ok(())
}

#[tokio::test]
async fn test_cancellation_stops_reading_and_signals_completion() -> Result<()> {
    let log = Arc::new(ScriptedLog::new());
    let dispatcher = RecordingDispatcher::new();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("blocking read", || log.read_count() == 1).await?;
    assert!(!handle.is_stopped());

    let observer = handle.clone();
    shutdown(&handle).await;

    assert!(handle.is_cancelled());
    assert!(handle.is_stopped());
    assert!(observer.is_stopped());
    // Waiting again returns immediately
    tokio::time::timeout(Duration::from_millis(100), observer.stopped())
        .await
        .expect("stopped() should resolve once stopped");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(log.read_count(), 1, "No read may be issued after stopping");
    assert_eq!(Arc::strong_count(&log), 1, "Log client still held after stop");
    Ok(())
}

#[tokio::test]
async fn test_completion_waits_for_in_flight_dispatches() -> Result<()> {
    let log = Arc::new(ScriptedLog::new());
    log.push_messages(STREAM, vec![valid("1", "e-1")?]);
    let dispatcher = RecordingDispatcher::gated();

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("dispatch started", || dispatcher.in_flight() == 1).await?;

    handle.cancel();
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(!handle.is_stopped(), "Stopped while a dispatch was still running");

    dispatcher.release(1);
    tokio::time::timeout(Duration::from_secs(1), handle.stopped())
        .await
        .expect("Subscription did not stop after dispatch returned");
    assert_eq!(log.acks(), vec![id("1")]);
    Ok(())
}

#[tokio::test]
async fn test_dispatch_concurrency_is_unbounded_by_default() -> Result<()> {
    let log = Arc::new(ScriptedLog::new());
    for n in 1..=5 {
        log.push_messages(STREAM, vec![valid(&n.to_string(), &format!("e-{}", n))?]);
    }
    let dispatcher = RecordingDispatcher::with_delay(Duration::from_millis(50));

    let handle = start(SubscriptionConfig::test(), &log, &dispatcher);
    wait_until("five acks", || log.acks().len() == 5).await?;
    shutdown(&handle).await;

    assert_eq!(dispatcher.peak_in_flight(), 5);
    Ok(())
}

#[tokio::test]
async fn test_max_in_flight_bounds_dispatch_concurrency() -> Result<()> {
    let log = Arc::new(ScriptedLog::new());
    for n in 1..=5 {
        log.push_messages(STREAM, vec![valid(&n.to_string(), &format!("e-{}", n))?]);
    }
    let dispatcher = RecordingDispatcher::with_delay(Duration::from_millis(20));
    let config = SubscriptionConfig::test().with_max_in_flight(2);

    let handle = start(config, &log, &dispatcher);
    wait_until("five acks", || log.acks().len() == 5).await?;
    shutdown(&handle).await;

    assert!(dispatcher.peak_in_flight() <= 2, "peak was {}", dispatcher.peak_in_flight());
    assert_eq!(dispatcher.count(), 5);
    Ok(())
}
