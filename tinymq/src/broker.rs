use std::sync::Arc;

use futures::FutureExt;
use log::debug;
use tokio::{
    net::TcpListener,
    select,
    sync::{broadcast, mpsc},
};

use crate::{
    config::Config,
    error::Result,
    network::ClientEventLoop,
    protocol::Router,
    EventSink, LogSink, Severity,
};

/// Clonable stop signal for a running broker, safe to trigger from a signal
/// handler task.
#[derive(Clone)]
pub struct BrokerHandle {
    shutdown_tx: broadcast::Sender<()>,
}

impl BrokerHandle {
    /// Stops the broker: the acceptor closes, session tasks exit and drop
    /// their sockets, and the router clears both registries.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// A broker node: one TCP acceptor, one router task, and one event loop task
/// per accepted connection.
pub struct Broker {
    cfg: Config,
    sink: Arc<dyn EventSink>,
    shutdown_tx: broadcast::Sender<()>,
}

impl Broker {
    pub fn new(cfg: Config) -> Self {
        Self::with_sink(cfg, Arc::new(LogSink))
    }

    pub fn with_sink(cfg: Config, sink: Arc<dyn EventSink>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            cfg,
            sink,
            shutdown_tx,
        }
    }

    pub fn handle(&self) -> BrokerHandle {
        BrokerHandle {
            shutdown_tx: self.shutdown_tx.clone(),
        }
    }

    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Runs until stopped. Returns only after the router has drained and
    /// cleared both registries, so a completed `run` means an empty broker.
    pub async fn run(&self) -> Result<()> {
        debug!("start router loop");
        let (router_tx, router_rx) = mpsc::channel(1024);
        let router = Router::new(self.cfg.session.clone(), self.sink.clone(), router_rx);
        let (router_task, router_handle) = router.start().remote_handle();
        tokio::spawn(router_task);

        let listener = TcpListener::bind(("0.0.0.0", self.cfg.broker.port)).await?;
        self.sink.event(
            Severity::Success,
            "Broker",
            &format!(
                "Started on port {} with {} worker threads",
                self.cfg.broker.port, self.cfg.broker.threads
            ),
        );

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let mut next_session_id: u64 = 0;

        loop {
            select! {
                accept = listener.accept() => {
                    let (stream, addr) = match accept {
                        Ok((stream, addr)) => (stream, addr),
                        Err(e) => {
                            self.sink.event(Severity::Error, "Broker", &format!("Accept error: {e}"));
                            continue;
                        }
                    };
                    self.sink.event(Severity::Incoming, "Broker", &format!("New connection from {addr}"));

                    next_session_id += 1;
                    let event_loop = ClientEventLoop::new(
                        next_session_id,
                        stream,
                        addr,
                        router_tx.clone(),
                        self.shutdown_tx.subscribe(),
                        self.sink.clone(),
                    );
                    tokio::spawn(async move {
                        if let Err(e) = event_loop.start().await {
                            debug!("event loop on conn {addr} exited: {e}");
                        }
                    });
                }
                _ = shutdown_rx.recv() => break,
            }
        }

        // Stop accepting, then wait for the router: it finishes once every
        // session task has exited and dropped its sender.
        drop(listener);
        drop(router_tx);
        router_handle.await;

        self.sink.event(Severity::Info, "Broker", "Stopped");
        Ok(())
    }
}
