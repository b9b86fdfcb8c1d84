/*!
Netplay Server Crate

Stellt den gRPC-Dienst `NetPlayServerService` bereit:
- Konsolen anlegen und Controller-Ports vergeben (`console`, `registry`)
- Key-Press-Events zwischen den Clients einer Konsole weiterleiten (`service`)
- Test-Modus mit Konsolenlimit und `ShutDownServer`

Öffentliche API:
- `start_server(ServerConfig) -> ServerHandle`
- `ServerHandle::{local_addr, shutdown, wait}`
*/

pub mod client;
pub mod console;
pub mod error;
pub mod registry;
pub mod service;
pub mod settings;

use std::net::SocketAddr;
use std::sync::Arc;

use netplay_shared::proto::net_play_server_service_server::NetPlayServerServiceServer;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::info;

pub use error::{ServerError, ServerResult};
pub use registry::ConsoleRegistry;
pub use service::NetplayService;
pub use settings::ServerConfig;

/// Handle to a running server task.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    registry: Arc<ConsoleRegistry>,
    shutdown: service::ShutdownTrigger,
    task: JoinHandle<Result<(), tonic::transport::Error>>,
}

impl ServerHandle {
    /// The address actually bound, useful when the configured port was 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn registry(&self) -> &Arc<ConsoleRegistry> {
        &self.registry
    }

    /// Stops all consoles and asks the server to shut down gracefully.
    pub fn shutdown(&self) {
        self.registry.stop_all("server shutting down");
        self.shutdown.send_replace(true);
    }

    /// Watches the shutdown flag; flips to `true` once a shutdown was requested.
    pub fn stopped(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    /// Resolves once the server stopped, either through [`ServerHandle::shutdown`]
    /// or a test-mode `ShutDownServer` request.
    pub async fn wait(self) -> ServerResult<()> {
        self.task.await??;
        info!("server stopped");
        Ok(())
    }
}

/// Binds the listener and spawns the gRPC server onto the current runtime.
pub async fn start_server(config: ServerConfig) -> ServerResult<ServerHandle> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let local_addr = listener.local_addr()?;

    let registry = Arc::new(ConsoleRegistry::new(config.effective_max_consoles()));
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let shutdown = Arc::new(shutdown_tx);
    let service = NetplayService::new(Arc::clone(&registry), config.test_mode, Arc::clone(&shutdown));

    let signal = async move {
        // An error means every sender is gone, which also ends the server.
        let _ = shutdown_rx.wait_for(|stop| *stop).await;
    };
    let task = tokio::spawn(
        tonic::transport::Server::builder()
            .add_service(NetPlayServerServiceServer::new(service))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal),
    );

    info!(%local_addr, test_mode = config.test_mode, "netplay server listening");
    Ok(ServerHandle {
        local_addr,
        registry,
        shutdown,
        task,
    })
}
