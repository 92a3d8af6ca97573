//! HTTP streaming server pushing the latest thermal frame to each client.

mod routes;
mod session;

use std::{
    convert::Infallible,
    net::SocketAddr,
    path::PathBuf,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use hyper::{server::conn::Http, service::service_fn, Request};
use thermcam_store::{FrameStore, HealthHandle};
use thermcam_types::{
    config::ServerConfig, frame::TemperatureUnit, Result, ThermcamError,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{lookup_host, TcpListener, TcpSocket, TcpStream},
    sync::{OwnedSemaphorePermit, Semaphore},
    time::{sleep, timeout},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub use session::{multipart_part, ClientSession, BOUNDARY};

/// Upper bound on how much of a rejected request is read before closing.
const MAX_REJECTED_HEAD: usize = 8 * 1024;

/// Everything the server reads from the rest of the process.
#[derive(Clone)]
pub struct StreamSources {
    pub store: FrameStore,
    pub health: HealthHandle,
    pub snapshot_dir: PathBuf,
    pub unit: TemperatureUnit,
}

pub(crate) struct ServerContext {
    pub(crate) config: ServerConfig,
    pub(crate) store: FrameStore,
    pub(crate) health: HealthHandle,
    pub(crate) snapshot_dir: PathBuf,
    pub(crate) unit: TemperatureUnit,
    pub(crate) admission: Arc<Semaphore>,
    pub(crate) active_streams: AtomicUsize,
    pub(crate) shutdown: CancellationToken,
}

impl ServerContext {
    pub(crate) fn active_connections(&self) -> usize {
        self.config
            .max_clients
            .saturating_sub(self.admission.available_permits())
    }

    /// Streaming sessions whose task is still running.
    pub(crate) fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }
}

pub struct StreamServer {
    listener: TcpListener,
    config: ServerConfig,
    sources: StreamSources,
}

impl StreamServer {
    pub async fn bind(config: ServerConfig, sources: StreamSources) -> Result<Self> {
        let target = format!("{}:{}", config.bind_addr, config.port);
        let addr = lookup_host(&target)
            .await
            .map_err(|err| network_error(format!("cannot resolve {target}: {err}")))?
            .next()
            .ok_or_else(|| network_error(format!("no address for {target}")))?;

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(|err| network_error(format!("socket creation failed: {err}")))?;
        socket
            .set_reuseaddr(true)
            .map_err(|err| network_error(format!("SO_REUSEADDR failed: {err}")))?;
        socket
            .bind(addr)
            .map_err(|err| network_error(format!("bind to {addr} failed: {err}")))?;
        let listener = socket
            .listen(config.listen_backlog)
            .map_err(|err| network_error(format!("listen on {addr} failed: {err}")))?;

        info!("Stream server listening on {}", addr);
        Ok(Self {
            listener,
            config,
            sources,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|err| network_error(format!("local address unavailable: {err}")))
    }

    /// Accepts connections until `shutdown` fires, then waits briefly for open
    /// sessions to wind down.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let limit = self.config.max_clients;
        let ctx = Arc::new(ServerContext {
            config: self.config.clone(),
            store: self.sources.store.clone(),
            health: self.sources.health.clone(),
            snapshot_dir: self.sources.snapshot_dir.clone(),
            unit: self.sources.unit,
            admission: Arc::new(Semaphore::new(limit)),
            active_streams: AtomicUsize::new(0),
            shutdown: shutdown.clone(),
        });

        loop {
            let (stream, peer) = tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!("Accept failed: {}", err);
                        sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                },
            };
            match Arc::clone(&ctx.admission).try_acquire_owned() {
                Ok(permit) => {
                    debug!("Accepted connection from {}", peer);
                    tokio::spawn(serve_connection(stream, peer, Arc::clone(&ctx), permit));
                }
                Err(_) => {
                    let err = ThermcamError::CapacityExceeded { limit };
                    warn!("Rejecting {}: {}", peer, err);
                    tokio::spawn(reject_connection(stream, err, ctx.config.write_timeout()));
                }
            }
        }

        info!(
            "Stream server stopping, {} connections open",
            ctx.active_connections()
        );
        let drain = ctx.admission.acquire_many(limit as u32);
        if timeout(ctx.config.write_timeout(), drain).await.is_err() {
            warn!("Connections still open after shutdown grace period");
        }
        Ok(())
    }
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    _permit: OwnedSemaphorePermit,
) {
    // Cancelled by a stream session that gave up on this client.
    let release = CancellationToken::new();
    let service_ctx = Arc::clone(&ctx);
    let service_release = release.clone();
    let service = service_fn(move |req: Request<hyper::Body>| {
        let ctx = Arc::clone(&service_ctx);
        let release = service_release.clone();
        async move { Ok::<_, Infallible>(routes::route(req, peer, ctx, release).await) }
    });
    let connection = Http::new()
        .http1_only(true)
        .serve_connection(stream, service);
    tokio::pin!(connection);

    tokio::select! {
        result = connection.as_mut() => {
            if let Err(err) = result {
                debug!("Connection from {} closed with error: {}", peer, err);
            }
        }
        _ = release.cancelled() => {
            debug!("Dropping connection from {} after its stream ended", peer);
        }
        _ = ctx.shutdown.cancelled() => {
            connection.as_mut().graceful_shutdown();
            match timeout(ctx.config.write_timeout(), connection).await {
                Ok(Err(err)) => debug!("Connection from {} closed with error: {}", peer, err),
                Err(_) => debug!("Connection from {} did not close in time", peer),
                Ok(Ok(())) => {}
            }
        }
    }
    debug!("Connection from {} released", peer);
}

async fn reject_connection(mut stream: TcpStream, err: ThermcamError, limit: Duration) {
    let body = format!("{err}\n");
    let response = format!(
        "HTTP/1.1 503 Service Unavailable\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nRetry-After: 1\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let write = async {
        stream.write_all(response.as_bytes()).await?;
        drain_request_head(&mut stream).await?;
        stream.shutdown().await
    };
    if let Err(err) = timeout(limit, write).await.unwrap_or_else(|_| {
        Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "rejection write timed out",
        ))
    }) {
        debug!("Failed to send capacity rejection: {}", err);
    }
}

/// Reads whatever request the client already sent so closing does not reset
/// the connection before it sees the response.
async fn drain_request_head(stream: &mut TcpStream) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while head.len() < MAX_REJECTED_HEAD && find_head_end(&head).is_none() {
        let read = stream.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        head.extend_from_slice(&chunk[..read]);
    }
    Ok(())
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|window| window == b"\r\n\r\n")
}

pub fn network_error(message: impl Into<String>) -> ThermcamError {
    ThermcamError::Network(message.into())
}
