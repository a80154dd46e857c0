use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};
use tokio_graceful_stop::{BoxedError, ManagedServer, StopSignal};

#[derive(Clone, Copy, Debug)]
pub enum ShutdownBehavior {
    /// Finishes after the given time.
    Succeed(Duration),
    /// Reports an error after the given time.
    Fail(Duration),
    /// Never finishes.
    Hang,
    /// Panics right away.
    Panic,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerEvent {
    ShutdownStarted { subsystems_notified: bool },
    ShutdownFinished,
    ForceClosed { subsystems_notified: bool },
}

/// Records every call made by the coordinator, together with whether the
/// probed subsystem was already notified at that point.
#[derive(Clone)]
pub struct ServerMock {
    behavior: ShutdownBehavior,
    probe: StopSignal,
    events: Arc<Mutex<Vec<ServerEvent>>>,
}

impl ServerMock {
    pub fn new(behavior: ShutdownBehavior, probe: StopSignal) -> Self {
        Self {
            behavior,
            probe,
            events: Default::default(),
        }
    }

    pub fn events(&self) -> Vec<ServerEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn force_close_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, ServerEvent::ForceClosed { .. }))
            .count()
    }

    fn record(&self, event: ServerEvent) {
        self.events.lock().unwrap().push(event);
    }
}

#[async_trait]
impl ManagedServer for ServerMock {
    async fn shutdown(&self) -> Result<(), BoxedError> {
        self.record(ServerEvent::ShutdownStarted {
            subsystems_notified: self.probe.is_fired(),
        });

        let result = match self.behavior {
            ShutdownBehavior::Succeed(duration) => {
                sleep(duration).await;
                Ok(())
            }
            ShutdownBehavior::Fail(duration) => {
                sleep(duration).await;
                Err(anyhow!("listener refused to close").into())
            }
            ShutdownBehavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            ShutdownBehavior::Panic => panic!("listener crashed"),
        };

        self.record(ServerEvent::ShutdownFinished);
        result
    }

    async fn force_close(&self) -> Result<(), BoxedError> {
        self.record(ServerEvent::ForceClosed {
            subsystems_notified: self.probe.is_fired(),
        });
        Ok(())
    }
}
