use nix::sys::signal::{raise, Signal};
use tokio::time::Duration;
use tokio_graceful_stop::{GracefulStop, StopState};

/// Raises `signal` in this process and expects it to drive the complete
/// shutdown sequence.
pub async fn test_termination_signal(signal: Signal) {
    let stop = GracefulStop::new(2, Duration::from_millis(20));
    let first = stop.subscribe();
    let second = stop.subscribe();

    assert!(stop.watch());

    raise(signal).unwrap();

    stop.wait_timeout(Duration::from_secs(5)).await.unwrap();

    assert_eq!(stop.state(), StopState::Finished);
    assert!(first.is_fired());
    assert!(second.is_fired());
}
