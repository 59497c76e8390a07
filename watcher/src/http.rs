use std::time::Duration;

use motion_diff_common::config::SourceConfig;
use motion_diff_common::frame::FrameBuffer;
use motion_diff_engine::source::{decode_frame, FrameSource, SourceError};
use tracing::debug;

use crate::WatcherError;

/// Polls a still-image endpoint (e.g. a camera's `/frame` URL) once per cycle.
pub struct HttpFrameSource {
    client: reqwest::Client,
    url: String,
    width: u32,
    height: u32,
    resize: bool,
    frames: u64,
}

impl HttpFrameSource {
    pub fn new(config: &SourceConfig, width: u32, height: u32) -> Result<Self, WatcherError> {
        if config.url.is_empty() {
            return Err(WatcherError::MissingSetting("source.url"));
        }
        let timeout = Duration::from_millis(config.timeout_ms);
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(WatcherError::HttpClient)?;
        Ok(Self {
            client,
            url: config.url.clone(),
            width,
            height,
            resize: config.resize,
            frames: 0,
        })
    }

    #[cfg(test)]
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSource for HttpFrameSource {
    async fn acquire_frame(&mut self) -> Result<FrameBuffer, SourceError> {
        let resp = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(SourceError::Status(resp.status().as_u16()));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SourceError::Unavailable(e.to_string()))?;
        let frame = decode_frame(&bytes, self.width, self.height, self.resize)?;

        self.frames += 1;
        debug!(frames = self.frames, bytes = bytes.len(), "fetched frame");
        Ok(frame)
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(width: u32, height: u32, value: u8) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([value, value, value, 255]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    async fn serve_camera() -> String {
        let frame = png(8, 6, 90);
        let app = Router::new()
            .route(
                "/frame",
                get(move || {
                    let frame = frame.clone();
                    async move { ([(header::CONTENT_TYPE, "image/png")], frame) }
                }),
            )
            .route("/broken", get(|| async { "not an image" }))
            .route("/down", get(|| async { StatusCode::SERVICE_UNAVAILABLE }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn source_config(url: String, resize: bool) -> SourceConfig {
        SourceConfig {
            mode: "http".into(),
            url,
            directory: String::new(),
            resize,
            timeout_ms: 2000,
        }
    }

    #[tokio::test]
    async fn fetches_and_resizes_frames() {
        let base = serve_camera().await;
        let mut source = HttpFrameSource::new(&source_config(format!("{base}/frame"), true), 4, 3).unwrap();

        let frame = source.acquire_frame().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 3));
        assert_eq!(frame.pixel(0).map(|p| p.g), Some(90));
        assert_eq!(source.frames(), 1);
    }

    #[tokio::test]
    async fn native_size_is_kept_without_resize() {
        let base = serve_camera().await;
        let mut source = HttpFrameSource::new(&source_config(format!("{base}/frame"), false), 4, 3).unwrap();
        let frame = source.acquire_frame().await.unwrap();
        assert_eq!((frame.width(), frame.height()), (8, 6));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let base = serve_camera().await;
        let mut source = HttpFrameSource::new(&source_config(format!("{base}/down"), true), 4, 3).unwrap();
        assert!(matches!(source.acquire_frame().await, Err(SourceError::Status(503))));
        assert_eq!(source.frames(), 0);
    }

    #[tokio::test]
    async fn undecodable_body_is_reported() {
        let base = serve_camera().await;
        let mut source = HttpFrameSource::new(&source_config(format!("{base}/broken"), true), 4, 3).unwrap();
        assert!(matches!(source.acquire_frame().await, Err(SourceError::Decode(_))));
    }

    #[tokio::test]
    async fn unreachable_camera_is_unavailable() {
        // Bind then drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let mut source = HttpFrameSource::new(&source_config(format!("http://{addr}/frame"), true), 4, 3).unwrap();
        assert!(matches!(source.acquire_frame().await, Err(SourceError::Unavailable(_))));
    }

    #[test]
    fn empty_url_is_rejected() {
        let result = HttpFrameSource::new(&source_config(String::new(), true), 4, 3);
        assert!(matches!(result, Err(WatcherError::MissingSetting("source.url"))));
    }
}
