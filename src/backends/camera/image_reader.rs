// SPDX-License-Identifier: GPL-3.0-only

//! Bounded pool of still-capture buffers
//!
//! The reader holds at most `max_images` native images at once, counting both
//! queued and acquired ones. A producer that finds the pool full has its
//! image dropped. Acquired images hand their slot back when the returned
//! guard is dropped.

use super::executor::ExecutorHandle;
use super::types::{ImageFormat, Size, SurfaceId};
use crate::errors::CaptureResult;
use crate::media::frame::{CropRect, FrameBuffer, Plane};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

/// Raw image as delivered by the hardware, before validation
#[derive(Debug, Clone)]
pub struct NativeImage {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub crop: CropRect,
    pub planes: Vec<Plane>,
    pub timestamp_ns: u64,
}

/// Image-available listener, invoked on the callback executor
pub type ImageListener = Arc<dyn Fn(&ImageReader) + Send + Sync>;

#[derive(Default)]
struct ReaderState {
    queue: VecDeque<NativeImage>,
    acquired: usize,
    listener: Option<ImageListener>,
    dropped: u64,
    closed: bool,
}

struct ReaderInner {
    id: SurfaceId,
    size: Size,
    format: ImageFormat,
    max_images: usize,
    state: Mutex<ReaderState>,
    executor: ExecutorHandle,
}

impl ReaderInner {
    fn lock(&self) -> MutexGuard<'_, ReaderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Consumer side of the still-capture surface
#[derive(Clone)]
pub struct ImageReader {
    inner: Arc<ReaderInner>,
}

/// Producer side, handed to the capture session as an output target
#[derive(Clone)]
pub struct ReaderSurface {
    inner: Arc<ReaderInner>,
}

impl ImageReader {
    pub fn new(
        size: Size,
        format: ImageFormat,
        max_images: usize,
        executor: ExecutorHandle,
    ) -> Self {
        Self {
            inner: Arc::new(ReaderInner {
                id: SurfaceId::next(),
                size,
                format,
                max_images: max_images.max(1),
                state: Mutex::new(ReaderState::default()),
                executor,
            }),
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    pub fn size(&self) -> Size {
        self.inner.size
    }

    pub fn format(&self) -> ImageFormat {
        self.inner.format
    }

    pub fn max_images(&self) -> usize {
        self.inner.max_images
    }

    pub fn surface(&self) -> ReaderSurface {
        ReaderSurface {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Bind the single image-available listener, replacing any previous one
    pub fn set_listener(&self, listener: ImageListener) {
        self.inner.lock().listener = Some(listener);
    }

    /// Take the newest queued image, releasing every older one
    pub fn acquire_latest(&self) -> Option<AcquiredImage> {
        let mut state = self.inner.lock();
        let image = state.queue.pop_back()?;
        let stale = state.queue.len();
        state.queue.clear();
        state.acquired += 1;
        drop(state);

        if stale > 0 {
            debug!(reader = %self.inner.id, stale, "Released older queued images");
        }
        Some(AcquiredImage {
            image,
            slot: ImageSlot {
                inner: Arc::clone(&self.inner),
            },
        })
    }

    /// Images handed out and not yet released
    pub fn acquired_count(&self) -> usize {
        self.inner.lock().acquired
    }

    /// Images queued and not yet acquired
    pub fn pending_count(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Images refused because the pool was full
    pub fn dropped_count(&self) -> u64 {
        self.inner.lock().dropped
    }

    /// Stop accepting images and discard the queue
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        state.queue.clear();
        state.listener = None;
    }
}

impl ReaderSurface {
    pub fn id(&self) -> SurfaceId {
        self.inner.id
    }

    pub fn size(&self) -> Size {
        self.inner.size
    }

    pub fn format(&self) -> ImageFormat {
        self.inner.format
    }

    /// Queue an image and notify the listener on the executor
    ///
    /// Returns `false` when the image was dropped because the reader is
    /// closed or all of its slots are taken.
    pub fn submit(&self, image: NativeImage) -> bool {
        let mut state = self.inner.lock();
        if state.closed {
            return false;
        }
        if state.queue.len() + state.acquired >= self.inner.max_images {
            state.dropped += 1;
            warn!(
                reader = %self.inner.id,
                max_images = self.inner.max_images,
                acquired = state.acquired,
                "Image reader full, dropping image"
            );
            return false;
        }
        state.queue.push_back(image);
        let listener = state.listener.clone();
        drop(state);

        if let Some(listener) = listener {
            let reader = ImageReader {
                inner: Arc::clone(&self.inner),
            };
            self.inner.executor.post(move || listener(&reader));
        }
        true
    }
}

impl std::fmt::Debug for ImageReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageReader")
            .field("id", &self.inner.id)
            .field("size", &self.inner.size)
            .field("max_images", &self.inner.max_images)
            .finish()
    }
}

impl std::fmt::Debug for ReaderSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderSurface")
            .field("id", &self.inner.id)
            .field("size", &self.inner.size)
            .finish()
    }
}

/// Returns one pool slot when dropped
struct ImageSlot {
    inner: Arc<ReaderInner>,
}

impl Drop for ImageSlot {
    fn drop(&mut self) {
        let mut state = self.inner.lock();
        state.acquired = state.acquired.saturating_sub(1);
    }
}

/// A native image checked out of the reader
pub struct AcquiredImage {
    image: NativeImage,
    slot: ImageSlot,
}

impl AcquiredImage {
    pub fn image(&self) -> &NativeImage {
        &self.image
    }

    /// Validate into a frame that keeps the slot until dropped
    ///
    /// On a layout error the slot is released immediately.
    pub fn into_frame(self) -> CaptureResult<StillFrame> {
        let NativeImage {
            format,
            width,
            height,
            crop,
            planes,
            timestamp_ns,
        } = self.image;
        let frame = FrameBuffer::new(format, width, height, crop, planes)?;
        Ok(StillFrame {
            frame,
            timestamp_ns,
            _slot: self.slot,
        })
    }
}

/// The live still frame
///
/// Dereferences to the [`FrameBuffer`]. Only one is expected to exist at a
/// time; drop it (or call [`release`](Self::release)) before requesting the
/// next still.
pub struct StillFrame {
    frame: FrameBuffer,
    timestamp_ns: u64,
    _slot: ImageSlot,
}

impl StillFrame {
    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    /// Return the native buffer to the pool
    pub fn release(self) {}
}

impl std::ops::Deref for StillFrame {
    type Target = FrameBuffer;

    fn deref(&self) -> &FrameBuffer {
        &self.frame
    }
}

impl std::fmt::Debug for StillFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StillFrame")
            .field("width", &self.frame.width())
            .field("height", &self.frame.height())
            .field("timestamp_ns", &self.timestamp_ns)
            .finish()
    }
}
