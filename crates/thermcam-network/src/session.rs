use std::{
    future::poll_fn,
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    task::Poll,
    time::Duration,
};

use bytes::{BufMut, Bytes, BytesMut};
use hyper::body::Sender;
use thermcam_store::FrameStore;
use thermcam_types::{
    frame::{ProcessedFrame, TemperatureUnit},
    ClientError,
};
use thermcam_vision::encode_jpeg;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::ServerContext;

pub const BOUNDARY: &str = "frame";

/// Per-connection streaming state.
#[derive(Debug, Clone)]
pub struct ClientSession {
    id: Uuid,
    peer: SocketAddr,
    cadence: Duration,
    last_sequence: Option<u64>,
    frames_sent: u64,
}

impl ClientSession {
    pub fn new(peer: SocketAddr, cadence: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            peer,
            cadence,
            last_sequence: None,
            frames_sent: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn cadence(&self) -> Duration {
        self.cadence
    }

    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// The store's frame if it is newer than anything this session has handled.
    pub fn next_frame(&self, store: &FrameStore) -> Option<Arc<ProcessedFrame>> {
        let frame = store.latest()?;
        match self.last_sequence {
            Some(last) if frame.sequence() <= last => None,
            _ => Some(frame),
        }
    }

    pub fn mark_sent(&mut self, sequence: u64) {
        self.last_sequence = Some(sequence);
        self.frames_sent += 1;
    }

    /// Moves past a frame without sending it.
    pub fn skip(&mut self, sequence: u64) {
        self.last_sequence = Some(sequence);
    }
}

/// One multipart section carrying an encoded frame.
pub fn multipart_part(frame: &ProcessedFrame, jpeg: &Bytes, unit: TemperatureUnit) -> Bytes {
    let stats = frame.stats();
    let header = format!(
        "--{BOUNDARY}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\nX-Frame-Sequence: {}\r\nX-Frame-Timestamp: {}\r\nX-Temperature-Min: {:.2}\r\nX-Temperature-Max: {:.2}\r\nX-Temperature-Unit: {}\r\n\r\n",
        jpeg.len(),
        frame.sequence(),
        frame.captured_at().to_rfc3339(),
        unit.from_celsius(stats.min_c),
        unit.from_celsius(stats.max_c),
        unit.symbol(),
    );
    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Counts a session as live until it is dropped.
struct LiveStream<'a>(&'a AtomicUsize);

impl<'a> LiveStream<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LiveStream<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Pushes frames to one client until it goes away, stalls, or the server shuts down.
///
/// Ending on a client error cancels `release`, which tells the connection
/// task to drop the socket even if hyper is still blocked flushing to it.
pub(crate) async fn run_session(
    mut session: ClientSession,
    mut sender: Sender,
    ctx: Arc<ServerContext>,
    release: CancellationToken,
) {
    let _live = LiveStream::enter(&ctx.active_streams);
    let write_timeout = ctx.config.write_timeout();
    let mut ticker = interval(session.cadence());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let ended = loop {
        tokio::select! {
            _ = ctx.shutdown.cancelled() => break None,
            _ = ticker.tick() => {}
        }
        let Some(frame) = session.next_frame(&ctx.store) else {
            if receiver_gone(&mut sender).await {
                break Some(ClientError::Disconnected);
            }
            continue;
        };
        let jpeg = match frame.encoded_or_try_init(|| encode_jpeg(&frame, ctx.config.jpeg_quality)) {
            Ok(jpeg) => jpeg,
            Err(err) => {
                warn!("Session {} skipping frame {}: {}", session.id, frame.sequence(), err);
                session.skip(frame.sequence());
                continue;
            }
        };
        let part = multipart_part(&frame, &jpeg, ctx.unit);
        match timeout(write_timeout, sender.send_data(part)).await {
            Ok(Ok(())) => {
                debug!("Session {} sent frame {}", session.id, frame.sequence());
                session.mark_sent(frame.sequence());
            }
            Ok(Err(err)) if err.is_closed() => break Some(ClientError::Disconnected),
            Ok(Err(err)) => break Some(ClientError::WriteFailed(err.to_string())),
            Err(_) => break Some(ClientError::Timeout(write_timeout)),
        }
    };

    match ended {
        Some(ClientError::Timeout(limit)) => {
            warn!(
                "Session {} ({}) stalled for {:?}, dropping it after {} frames",
                session.id, session.peer, limit, session.frames_sent
            );
            sender.abort();
            release.cancel();
        }
        Some(reason) => {
            info!(
                "Session {} ({}) ended after {} frames: {}",
                session.id, session.peer, session.frames_sent, reason
            );
            release.cancel();
        }
        None => info!("Session {} ({}) closed for shutdown", session.id, session.peer),
    }
}

/// True once hyper has dropped the response body, so nobody is listening.
async fn receiver_gone(sender: &mut Sender) -> bool {
    poll_fn(|cx| Poll::Ready(matches!(sender.poll_ready(cx), Poll::Ready(Err(_))))).await
}
