use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::fetch::FileDownloader;
use super::reference::ImageReference;

/// In-memory transport that records call counts and peak concurrency.
#[derive(Default)]
pub(crate) struct StubDownloader {
    files: HashMap<String, Vec<u8>>,
    delay: Option<Duration>,
    /// Token cancelled once this many downloads have completed.
    cancel_after: Option<(usize, CancellationToken)>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl StubDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(mut self, url: &str, data: Vec<u8>) -> Self {
        self.files.insert(url.to_string(), data);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn cancel_after(mut self, calls: usize, token: CancellationToken) -> Self {
        self.cancel_after = Some((calls, token));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileDownloader for StubDownloader {
    async fn download(&self, url: &str, sink: &mut Vec<u8>) -> anyhow::Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let data = self
            .files
            .get(url)
            .ok_or_else(|| anyhow::anyhow!("404 Not Found for {url}"))?;
        sink.extend_from_slice(data);

        if let Some((after, token)) = &self.cancel_after {
            if call >= *after {
                token.cancel();
            }
        }
        Ok(())
    }
}

/// PNG signature padded to `len` bytes. Sniffs as PNG but does not decode.
pub(crate) fn png_stub(len: usize) -> Vec<u8> {
    let mut data = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    data.resize(len.max(8), 0);
    data
}

/// A decodable PNG with a noisy gradient so JPEG quality affects size.
pub(crate) fn real_png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        let noise = (x.wrapping_mul(7919) ^ y.wrapping_mul(104_729)) % 64;
        image::Rgb([
            ((x * 255 / width.max(1)) as u8).wrapping_add(noise as u8),
            ((y * 255 / height.max(1)) as u8).wrapping_sub(noise as u8),
            ((x + y) % 256) as u8,
        ])
    });
    let mut out = Cursor::new(Vec::new());
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("encode test PNG");
    out.into_inner()
}

pub(crate) fn ref_with_url(id: &str, url: &str) -> ImageReference {
    ImageReference {
        file_id: Some(id.to_string()).filter(|id| !id.is_empty()),
        name: format!("{}.png", if id.is_empty() { "image" } else { id }),
        mime_type: "image/png".to_string(),
        size: 0,
        url: url.to_string(),
        message_ts: String::new(),
    }
}
