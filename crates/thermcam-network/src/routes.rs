use std::{net::SocketAddr, sync::Arc, time::Duration};

use hyper::{
    header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA},
    Body, Method, Request, Response, StatusCode,
};
use serde::Serialize;
use thermcam_types::{
    config::ServerConfig,
    frame::{ProcessedFrame, TemperatureUnit},
    health::SensorHealth,
};
use thermcam_vision::{encode_jpeg, persist_snapshot};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    session::{run_session, ClientSession, BOUNDARY},
    ServerContext,
};

const INDEX_PAGE: &str = r#"<!DOCTYPE html>
<html>
  <head>
    <meta charset="utf-8">
    <title>Thermal Camera</title>
    <style>
      body { background: #111; color: #ddd; font-family: sans-serif; text-align: center; }
      img { max-width: 100%; image-rendering: pixelated; }
    </style>
  </head>
  <body>
    <h1>Thermal Camera</h1>
    <img src="/stream.mjpg" alt="live thermal stream">
    <form method="post" action="/snapshot"><button type="submit">Save snapshot</button></form>
  </body>
</html>
"#;

#[derive(Debug, Serialize)]
struct FrameReport {
    sequence: u64,
    captured_at: String,
    width: u32,
    height: u32,
    min: f32,
    max: f32,
    mean: f32,
}

impl FrameReport {
    fn new(frame: &ProcessedFrame, unit: TemperatureUnit) -> Self {
        let stats = frame.stats();
        Self {
            sequence: frame.sequence(),
            captured_at: frame.captured_at().to_rfc3339(),
            width: frame.width(),
            height: frame.height(),
            min: unit.from_celsius(stats.min_c),
            max: unit.from_celsius(stats.max_c),
            mean: unit.from_celsius(stats.mean_c),
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    sensor: SensorHealth,
    latest_frame: Option<FrameReport>,
    active_connections: usize,
    active_streams: usize,
    unit: TemperatureUnit,
}

pub(crate) async fn route(
    req: Request<Body>,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    release: CancellationToken,
) -> Response<Body> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    drop(req);
    match (&method, uri.path()) {
        (&Method::GET, "/") | (&Method::GET, "/index.html") => {
            respond(StatusCode::OK, "text/html; charset=utf-8", INDEX_PAGE)
        }
        (&Method::GET, "/stream.mjpg") | (&Method::GET, "/stream") => {
            start_stream(uri.query(), peer, ctx, release)
        }
        (&Method::GET, "/snapshot.jpg") => current_jpeg(&ctx),
        (&Method::POST, "/snapshot") => save_snapshot(&ctx).await,
        (&Method::GET, "/health") => status(&ctx),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "not found\n"),
    }
}

fn start_stream(
    query: Option<&str>,
    peer: SocketAddr,
    ctx: Arc<ServerContext>,
    release: CancellationToken,
) -> Response<Body> {
    let session = ClientSession::new(peer, requested_cadence(query, &ctx.config));
    info!(
        "Session {} started for {} at {:?} per frame",
        session.id(),
        peer,
        session.cadence()
    );
    let (sender, body) = Body::channel();
    tokio::spawn(run_session(session, sender, ctx, release));

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    if let Ok(value) =
        HeaderValue::from_str(&format!("multipart/x-mixed-replace; boundary={BOUNDARY}"))
    {
        headers.insert(CONTENT_TYPE, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// Frame interval for a client, honouring `?fps=` within the server limit.
pub(crate) fn requested_cadence(query: Option<&str>, config: &ServerConfig) -> Duration {
    let requested = query
        .into_iter()
        .flat_map(|q| q.split('&'))
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "fps")
        .and_then(|(_, value)| value.parse::<f32>().ok())
        .filter(|fps| fps.is_finite() && *fps > 0.0);
    let fps = requested
        .unwrap_or(config.default_client_fps)
        .min(config.max_client_fps);
    Duration::from_nanos((1e9 / fps as f64).round() as u64)
}

fn current_jpeg(ctx: &ServerContext) -> Response<Body> {
    let Some(frame) = ctx.store.latest() else {
        return respond(
            StatusCode::SERVICE_UNAVAILABLE,
            "text/plain",
            "no frame captured yet\n",
        );
    };
    match frame.encoded_or_try_init(|| encode_jpeg(&frame, ctx.config.jpeg_quality)) {
        Ok(jpeg) => respond(StatusCode::OK, "image/jpeg", jpeg),
        Err(err) => {
            warn!("Snapshot encoding failed: {}", err);
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                format!("{err}\n"),
            )
        }
    }
}

async fn save_snapshot(ctx: &ServerContext) -> Response<Body> {
    let Some(frame) = ctx.store.latest() else {
        return respond(
            StatusCode::SERVICE_UNAVAILABLE,
            "text/plain",
            "no frame captured yet\n",
        );
    };
    let dir = ctx.snapshot_dir.clone();
    let saved = tokio::task::spawn_blocking(move || persist_snapshot(&frame, &dir)).await;
    match saved {
        Ok(Ok(path)) => {
            info!("Snapshot saved to {}", path.display());
            json(
                StatusCode::OK,
                &serde_json::json!({ "path": path.display().to_string() }),
            )
        }
        Ok(Err(err)) => {
            warn!("Snapshot failed: {}", err);
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                format!("{err}\n"),
            )
        }
        Err(err) => {
            warn!("Snapshot task failed: {}", err);
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain",
                "snapshot task failed\n",
            )
        }
    }
}

fn status(ctx: &ServerContext) -> Response<Body> {
    let report = StatusReport {
        sensor: ctx.health.snapshot(),
        latest_frame: ctx
            .store
            .latest()
            .map(|frame| FrameReport::new(&frame, ctx.unit)),
        active_connections: ctx.active_connections(),
        active_streams: ctx.active_streams(),
        unit: ctx.unit,
    };
    json(StatusCode::OK, &report)
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(status, "application/json", body),
        Err(err) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            "text/plain",
            format!("serialization failed: {err}\n"),
        ),
    }
}

fn respond(status: StatusCode, content_type: &'static str, body: impl Into<Body>) -> Response<Body> {
    let mut response = Response::new(body.into());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ServerConfig {
        ServerConfig {
            default_client_fps: 5.0,
            max_client_fps: 20.0,
            ..ServerConfig::default()
        }
    }

    #[test]
    fn cadence_defaults_without_query() {
        assert_eq!(requested_cadence(None, &config()), Duration::from_millis(200));
        assert_eq!(
            requested_cadence(Some("quality=high"), &config()),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn cadence_honours_and_caps_requested_fps() {
        assert_eq!(
            requested_cadence(Some("fps=10"), &config()),
            Duration::from_millis(100)
        );
        assert_eq!(
            requested_cadence(Some("x=1&fps=100"), &config()),
            Duration::from_millis(50)
        );
    }

    #[test]
    fn cadence_ignores_nonsense() {
        for query in ["fps=0", "fps=-3", "fps=abc", "fps=inf"] {
            assert_eq!(
                requested_cadence(Some(query), &config()),
                Duration::from_millis(200),
                "{query}"
            );
        }
    }
}
