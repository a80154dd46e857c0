use tokio::time::{sleep, Instant};
use tracing_test::traced_test;

use super::*;

fn coordinator(timeout: Duration) -> GracefulStop {
    GracefulStop::builder()
        .timeout(timeout)
        .catch_signals(false)
        .build()
}

#[tokio::test(start_paused = true)]
async fn wait_returns_immediately_if_never_watched() {
    let stop = coordinator(Duration::from_secs(1));
    stop.subscribe();

    let start = Instant::now();
    stop.wait().await;

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(stop.state(), StopState::Idle);
    assert!(!stop.is_finished());
}

#[tokio::test(start_paused = true)]
async fn watch_activates_only_once() {
    let stop = coordinator(Duration::ZERO);

    assert!(stop.watch());
    assert!(!stop.watch());
    assert!(!stop.clone().watch());
    assert_eq!(stop.state(), StopState::Watching);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_watch_activates_only_once() {
    let stop = coordinator(Duration::ZERO);

    let callers = (0..32)
        .map(|_| {
            let stop = stop.clone();
            tokio::spawn(async move { stop.watch() })
        })
        .collect::<Vec<_>>();

    let mut winners = 0;
    for caller in callers {
        if caller.await.unwrap() {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);

    assert!(stop.request_shutdown());
    stop.wait_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(stop.state(), StopState::Finished);
}

#[tokio::test(start_paused = true)]
async fn request_shutdown_runs_sequence() {
    let stop = coordinator(Duration::ZERO);
    stop.watch();

    let start = Instant::now();
    assert!(stop.request_shutdown());
    stop.wait().await;

    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(stop.state(), StopState::Finished);
    assert!(stop.is_finished());
}

#[tokio::test(start_paused = true)]
async fn request_before_watch_stays_pending() {
    let stop = coordinator(Duration::ZERO);

    assert!(stop.request_shutdown());
    assert!(!stop.request_shutdown());

    sleep(Duration::from_millis(100)).await;
    assert_eq!(stop.state(), StopState::Idle);

    stop.watch();
    stop.wait_timeout(Duration::from_millis(100)).await.unwrap();
    assert_eq!(stop.state(), StopState::Finished);

    // The watch loop is gone, nobody listens any more.
    assert!(!stop.request_shutdown());
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn abort_skips_shutdown_sequence() {
    let stop = coordinator(Duration::ZERO);
    let subsystem = stop.subscribe();
    stop.watch();

    stop.abort();
    stop.abort();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(stop.state(), StopState::Aborted);
    assert!(!subsystem.is_fired());
    assert!(logs_contain("Watch aborted."));

    // Shutdown requests no longer have any effect.
    assert!(!stop.request_shutdown());

    // Completion is never reported after an abort.
    assert!(stop.wait_timeout(Duration::from_secs(60)).await.is_err());
    assert!(!stop.is_finished());
}

#[tokio::test(start_paused = true)]
async fn abort_before_watch() {
    let stop = coordinator(Duration::ZERO);
    stop.abort();

    // Never started, so nothing to wait for.
    stop.wait_timeout(Duration::from_millis(1)).await.unwrap();

    stop.watch();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(stop.state(), StopState::Aborted);
}

#[tokio::test(start_paused = true)]
async fn abort_wins_against_pending_request() {
    let stop = coordinator(Duration::ZERO);
    let subsystem = stop.subscribe();

    stop.request_shutdown();
    stop.abort();
    stop.watch();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(stop.state(), StopState::Aborted);
    assert!(!subsystem.is_fired());
}

#[tokio::test(start_paused = true)]
async fn abort_after_trigger_does_not_interrupt_sequence() {
    let stop = coordinator(Duration::from_millis(50));
    let subsystem = stop.subscribe();
    stop.watch();

    stop.request_shutdown();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(stop.state(), StopState::ShuttingDown);

    stop.abort();
    stop.wait_timeout(Duration::from_millis(100)).await.unwrap();

    assert!(subsystem.is_fired());
    assert_eq!(stop.state(), StopState::Finished);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_abort_without_watch_never_hangs() {
    let stop = coordinator(Duration::ZERO);

    let callers = (0..32)
        .map(|_| {
            let stop = stop.clone();
            tokio::spawn(async move { stop.abort() })
        })
        .collect::<Vec<_>>();
    for caller in callers {
        caller.await.unwrap();
    }

    stop.wait_timeout(Duration::from_secs(5)).await.unwrap();
    assert_eq!(stop.state(), StopState::Idle);
}

#[tokio::test(start_paused = true)]
#[traced_test]
async fn late_registration_is_reported() {
    let stop = coordinator(Duration::from_millis(50));
    stop.subscribe();
    stop.watch();
    stop.request_shutdown();
    sleep(Duration::from_millis(10)).await;

    let late = stop.subscribe();
    assert!(logs_contain("Subsystem registered after shutdown started"));

    stop.wait().await;
    assert!(!late.is_fired());
}

#[tokio::test(start_paused = true)]
async fn cancellation_tokens_can_be_registered() {
    let stop = coordinator(Duration::ZERO);
    let token = CancellationToken::new();
    stop.add(token.clone());
    stop.add(token.child_token());

    stop.watch();
    stop.request_shutdown();
    stop.wait().await;

    assert!(token.is_cancelled());
}

#[test]
#[traced_test]
fn watch_outside_of_runtime_keeps_coordinator_usable() {
    let stop = coordinator(Duration::ZERO);

    assert!(!stop.watch());
    assert_eq!(stop.state(), StopState::Idle);
    assert!(logs_contain("Not inside of a Tokio runtime, unable to watch."));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        assert!(stop.watch());
        assert!(stop.request_shutdown());
        stop.wait_timeout(Duration::from_secs(1)).await.unwrap();
    });

    assert_eq!(stop.state(), StopState::Finished);
}

#[test]
fn watch_from_plain_thread_has_no_effect() {
    let stop = coordinator(Duration::ZERO);

    let started = std::thread::spawn({
        let stop = stop.clone();
        move || stop.watch()
    })
    .join()
    .unwrap();

    assert!(!started);
    assert_eq!(stop.state(), StopState::Idle);
}

#[test]
fn debug_output_after_shutdown() {
    let stop = coordinator(Duration::ZERO);
    stop.subscribe();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    runtime.block_on(async {
        stop.watch();
        stop.request_shutdown();
        stop.wait().await;
    });

    let output = format!("{stop:?}");
    assert!(output.contains("state: Finished"));
    assert!(output.contains("pending_subsystems: 0"));
}

#[test]
fn debug_output() {
    let stop = GracefulStop::new(2, Duration::from_secs(1));
    stop.subscribe();

    let output = format!("{stop:?}");

    assert!(output.contains("state: Idle"));
    assert!(output.contains("pending_subsystems: 1"));
    assert!(output.contains("has_server: false"));
}

#[test]
fn defaults_apply() {
    let stop = GracefulStop::builder().build();

    assert_eq!(stop.inner.timeout, DEFAULT_TIMEOUT);
    assert_eq!(stop.inner.server_timeout, DEFAULT_SERVER_TIMEOUT);
    assert!(stop.inner.catch_signals);
}
