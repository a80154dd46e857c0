//! This example demonstrates how to gracefully shut down a TCP echo server
//! and a background subsystem that depends on it.
//!
//! On SIGINT (Ctrl+C) or SIGTERM, the server stops accepting connections and
//! waits for the open ones to finish. Connections still open after the server
//! timeout get dropped. Afterwards, the statistics subsystem is told to stop
//! and gets a short grace period to print its final report.
//!
//! Connect with `nc 127.0.0.1 12345`, then press Ctrl+C in the server's terminal.

use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use miette::{Context, IntoDiagnostic, Result};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::{sleep, Duration},
};
use tokio_graceful_stop::{BoxedError, GracefulStop, ManagedServer, StopSignal};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

async fn echo_connection(tcp: &mut TcpStream) -> std::io::Result<()> {
    tcp.write_all(b"Hello!\r\n").await?;

    let mut buffer = [0u8; 256];
    loop {
        match tcp.read(&mut buffer).await? {
            0 => return Ok(()),
            len => {
                let bytes = &mut buffer[..len];
                bytes.make_ascii_uppercase();
                tcp.write_all(bytes).await?;
            }
        }
    }
}

struct EchoServer {
    stop_accepting: CancellationToken,
    drop_connections: CancellationToken,
    connections: TaskTracker,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl EchoServer {
    async fn start(addr: SocketAddr, served: Arc<AtomicUsize>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .into_diagnostic()
            .context("Unable to start tcp server")?;
        tracing::info!("Listening on {}", addr);

        let stop_accepting = CancellationToken::new();
        let drop_connections = CancellationToken::new();
        let connections = TaskTracker::new();

        let accept_loop = tokio::spawn({
            let stop_accepting = stop_accepting.clone();
            let drop_connections = drop_connections.clone();
            let connections = connections.clone();
            async move {
                loop {
                    let (mut tcp, addr) = tokio::select! {
                        _ = stop_accepting.cancelled() => break,
                        connection = listener.accept() => match connection {
                            Ok(connection) => connection,
                            Err(e) => {
                                tracing::warn!("Error while waiting for connection: {}", e);
                                continue;
                            }
                        },
                    };

                    served.fetch_add(1, Ordering::Relaxed);
                    let drop_connections = drop_connections.clone();
                    connections.spawn(async move {
                        tracing::info!("Connected to {} ...", addr);
                        tokio::select! {
                            result = echo_connection(&mut tcp) => match result {
                                Ok(()) => tracing::info!("Connection to {} closed.", addr),
                                Err(e) => tracing::warn!("Error serving {}: {}", addr, e),
                            },
                            _ = drop_connections.cancelled() => {
                                tracing::warn!("Dropping connection to {}.", addr);
                            }
                        }
                    });
                }
                tracing::info!("No longer accepting connections.");
            }
        });

        Ok(Self {
            stop_accepting,
            drop_connections,
            connections,
            listener: std::sync::Mutex::new(Some(accept_loop)),
        })
    }
}

#[async_trait]
impl ManagedServer for EchoServer {
    async fn shutdown(&self) -> Result<(), BoxedError> {
        self.stop_accepting.cancel();

        let listener = self.listener.lock().unwrap().take();
        if let Some(listener) = listener {
            listener.await?;
        }

        self.connections.close();
        self.connections.wait().await;
        Ok(())
    }

    async fn force_close(&self) -> Result<(), BoxedError> {
        self.drop_connections.cancel();
        Ok(())
    }
}

async fn statistics(served: Arc<AtomicUsize>, stop: StopSignal) {
    loop {
        tokio::select! {
            _ = stop.stopped() => break,
            _ = sleep(Duration::from_secs(10)) => {
                tracing::info!("Connections served so far: {}", served.load(Ordering::Relaxed));
            }
        }
    }

    // Pretend the final report takes a moment to write.
    sleep(Duration::from_millis(200)).await;
    tracing::info!(
        "Final report: {} connections served.",
        served.load(Ordering::Relaxed)
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Init logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let stop = GracefulStop::builder()
        .capacity(1)
        .timeout(Duration::from_millis(500))
        .server_timeout(Duration::from_secs(5))
        .build();

    let served = Arc::new(AtomicUsize::new(0));
    tokio::spawn(statistics(Arc::clone(&served), stop.subscribe()));

    let server = EchoServer::start(([127, 0, 0, 1], 12345).into(), served).await?;
    stop.set_server_and_watch(server);

    stop.wait().await;
    Ok(())
}
