//! Background HTTP server with a blocking start/shutdown API

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use cca_player::Controller;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::oneshot;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::error::{Result, ServerError};
use crate::routes::{self, RouteContext};

/// HTTP server for the control page, the command endpoint and media files.
///
/// The server runs its own tokio runtime on a dedicated thread so the
/// console loop and one-shot commands stay synchronous. Commands are handed
/// to the [`Controller`] on the runtime's blocking pool.
///
/// # Example
///
/// ```no_run
/// # use cca_player::{Controller, MediaSource, NetworkProvider, PlayerConfig, SessionRegistry};
/// # use cca_server::{CommandServer, ServerConfig};
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// let config = ServerConfig::new("/opt/s2c/web", "/opt/s2c/ZPL");
/// let media = MediaSource::new("http://192.168.1.20:8000/".parse().unwrap(), config.serve_root());
/// let registry = SessionRegistry::new(
///     Arc::new(NetworkProvider::new(Duration::from_secs(3))),
///     PlayerConfig::new(media),
/// );
/// let server = CommandServer::start(&config, Controller::new(registry)).unwrap();
/// println!("listening on port {}", server.port());
/// server.shutdown();
/// ```
pub struct CommandServer {
    addr: SocketAddr,
    ip: IpAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CommandServer {
    /// Bind the port and start serving. Returns once the server accepts
    /// connections.
    pub fn start(config: &ServerConfig, controller: Controller) -> Result<Self> {
        let ip = local_ip();
        let port = config.port;
        let web_dir = config.web_dir.clone();
        let serve_root = config.serve_root();

        let (ready_tx, ready_rx) = mpsc::channel::<Result<SocketAddr>>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("http-server".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(ServerError::Runtime(e)));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let listener = match bind(port) {
                        Ok(listener) => listener,
                        Err(source) => {
                            let _ = ready_tx.send(Err(ServerError::Bind { port, source }));
                            return;
                        }
                    };
                    let addr = match listener.local_addr() {
                        Ok(addr) => addr,
                        Err(source) => {
                            let _ = ready_tx.send(Err(ServerError::Bind { port, source }));
                            return;
                        }
                    };

                    let routes = routes::routes(RouteContext {
                        controller,
                        web_dir,
                        serve_root,
                        ip,
                        port: addr.port(),
                    });
                    let server = warp::serve(routes).serve_incoming_with_graceful_shutdown(
                        TcpListenerStream::new(listener),
                        async move {
                            let _ = shutdown_rx.await;
                        },
                    );

                    let _ = ready_tx.send(Ok(addr));
                    server.await;
                    debug!("HTTP server stopped");
                });
            })
            .map_err(ServerError::Runtime)?;

        let addr = ready_rx.recv().map_err(|_| ServerError::Startup)??;
        info!("Serving HTTP on {} port {} (http://{}:{}/) ...", addr.ip(), addr.port(), ip, addr.port());

        Ok(Self {
            addr,
            ip,
            shutdown_tx: Some(shutdown_tx),
            thread: Some(thread),
        })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Address other hosts reach this server on
    pub fn ip(&self) -> IpAddr {
        self.ip
    }

    /// `http://<ip>:<port>/`, the base of every media URL
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/", self.ip, self.port())
    }

    /// Stop accepting connections, finish in-flight requests and wait for
    /// the server thread.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("HTTP server thread panicked");
            }
        }
    }
}

impl Drop for CommandServer {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for CommandServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandServer")
            .field("addr", &self.addr)
            .field("ip", &self.ip)
            .finish()
    }
}

/// Listen on all interfaces with address reuse, so a quick restart does not
/// fail on a socket in TIME_WAIT.
fn bind(port: u16) -> io::Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port))?;
    socket.listen(1024)
}

/// The address of the interface used for outbound traffic.
///
/// Connecting a UDP socket sends nothing; it only selects a route. Falls
/// back to loopback when there is no route.
pub fn local_ip() -> IpAddr {
    detect_local_ip().unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn detect_local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("10.255.255.255:1").ok()?;
    Some(socket.local_addr().ok()?.ip())
}
