use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::NetworkConfig;
use crate::error::Result;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::handshake::CredentialStore;
use crate::protocol::session::Session;
use crate::utils::metrics::Metrics;
use crate::utils::timeout::with_timeout;

/// TCP listener that runs one [`Session`] task per accepted connection.
///
/// Sessions share nothing but the read-only credential store, the dispatcher and the
/// metrics counters.
pub struct Server {
    listener: TcpListener,
    config: NetworkConfig,
    store: Arc<dyn CredentialStore>,
    dispatcher: Dispatcher,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("address", &self.listener.local_addr().ok())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl Server {
    /// Bind `config.server.address`. Port 0 picks a free port; see [`Server::local_addr`].
    #[instrument(skip(config, store), fields(address = %config.server.address))]
    pub async fn bind(config: NetworkConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let listener = TcpListener::bind(&config.server.address).await?;
        info!(address = %listener.local_addr()?, "Listening");
        Ok(Self {
            listener,
            config,
            store,
            dispatcher: Dispatcher::new(),
            metrics: Arc::new(Metrics::new()),
        })
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Serve until CTRL+C
    pub async fn run(self) -> Result<()> {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);

        let signal_tx = shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received CTRL+C signal, shutting down");
                    let _ = signal_tx.send(()).await;
                }
                Err(e) => error!(error = %e, "Could not listen for CTRL+C"),
            }
        });

        // Held so a failed signal listener does not read as a shutdown request.
        let _shutdown_tx = shutdown_tx;
        self.run_with_shutdown(shutdown_rx).await
    }

    /// Serve until a message arrives on `shutdown_rx` (or every sender is dropped).
    ///
    /// On shutdown the listener stops accepting and open sessions get
    /// `server.shutdown_timeout` to finish before they are aborted.
    #[instrument(skip_all)]
    pub async fn run_with_shutdown(self, mut shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let limit = Arc::new(Semaphore::new(self.config.server.max_connections));
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!(
                        active = sessions.len(),
                        "Shutting down server. Waiting for connections to close..."
                    );
                    break;
                }

                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Session task failed");
                    }
                }

                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let Ok(permit) = Arc::clone(&limit).try_acquire_owned() else {
                                warn!(%peer, "Connection limit reached, refusing connection");
                                self.metrics.connection_refused();
                                continue;
                            };
                            info!(%peer, "New connection established");
                            self.metrics.connection_established();

                            let session = self.session_for(stream, peer);
                            let store = Arc::clone(&self.store);
                            let metrics = Arc::clone(&self.metrics);
                            sessions.spawn(async move {
                                let _permit = permit;
                                let _open = OpenConnection(Arc::clone(&metrics));
                                let mut session = session;
                                if session.run(store.as_ref()).await.is_err() {
                                    metrics.connection_error();
                                }
                                info!(%peer, "Connection closed");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Error accepting connection");
                        }
                    }
                }
            }
        }

        drop(self.listener);
        let drained = with_timeout(
            async {
                while sessions.join_next().await.is_some() {}
            },
            self.config.server.shutdown_timeout,
        )
        .await;

        if drained.is_err() {
            warn!(remaining = sessions.len(), "Shutdown timeout reached, aborting sessions");
            sessions.abort_all();
            while sessions.join_next().await.is_some() {}
        } else {
            info!("All connections closed, shutting down");
        }

        self.metrics.log_metrics();
        Ok(())
    }

    fn session_for(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> Session<tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf> {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, error = %e, "Could not disable Nagle");
        }
        let (read_half, write_half) = stream.into_split();
        Session::new(read_half, write_half)
            .with_peer(peer.to_string())
            .with_dispatcher(self.dispatcher.clone())
            .with_max_field_len(self.config.transport.max_field_size)
            .with_handshake_timeout(Some(self.config.server.handshake_timeout))
            .with_metrics(Arc::clone(&self.metrics))
    }
}

/// Counts the connection as closed when the session task ends, aborted or not.
struct OpenConnection(Arc<Metrics>);

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.0.connection_closed();
    }
}
