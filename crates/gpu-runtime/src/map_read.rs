//! Asynchronous map-read completion.
//!
//! A map request is recorded with the serial of the submission that last wrote
//! the buffer. The callback only sees the mapped bytes once that serial has
//! completed, so the host never reads memory the GPU may still be writing.

use std::ops::Range;

use tracing::trace;

use crate::objects::BufferId;
use crate::serial::{Serial, SerialQueue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapReadStatus {
    Success,
    Error,
    /// The buffer was unmapped or destroyed before the read completed.
    Unknown,
    ContextLost,
}

pub type MapReadCallback = Box<dyn FnOnce(MapReadStatus, Option<&[u8]>)>;

struct MapReadRequest<M> {
    buffer: BufferId,
    request_serial: u32,
    mapping: M,
    range: Range<usize>,
    callback: Option<MapReadCallback>,
}

/// Pending map-read requests, keyed by submission serial.
pub struct MapReadTracker<M> {
    inflight: SerialQueue<MapReadRequest<M>>,
}

impl<M> Default for MapReadTracker<M> {
    fn default() -> Self {
        Self {
            inflight: SerialQueue::new(),
        }
    }
}

impl<M: AsRef<[u8]>> MapReadTracker<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request whose data becomes readable once `serial` completes.
    ///
    /// `request_serial` identifies the map operation on the buffer (it is
    /// reported back in traces only).
    pub fn track(
        &mut self,
        buffer: BufferId,
        request_serial: u32,
        mapping: M,
        range: Range<usize>,
        callback: MapReadCallback,
        serial: Serial,
    ) {
        self.inflight.enqueue(
            MapReadRequest {
                buffer,
                request_serial,
                mapping,
                range,
                callback: Some(callback),
            },
            serial,
        );
    }

    /// Fires the callbacks of every request whose serial is `<= finished`, in
    /// request order.
    pub fn tick(&mut self, finished: Serial) {
        for request in self.inflight.iterate_up_to_mut(finished) {
            let Some(callback) = request.callback.take() else {
                continue;
            };
            trace!(
                buffer = request.buffer.0,
                request = request.request_serial,
                "map read finished"
            );
            match request.mapping.as_ref().get(request.range.clone()) {
                Some(data) => callback(MapReadStatus::Success, Some(data)),
                None => callback(MapReadStatus::Error, None),
            }
        }
        self.inflight.clear_up_to(finished);
    }

    /// Fails outstanding requests on `buffer` with [`MapReadStatus::Unknown`].
    ///
    /// The entries stay queued until their serial passes so the mapping they
    /// hold is not released while the GPU may still write it.
    pub fn cancel(&mut self, buffer: BufferId) {
        for request in self.inflight.iter_mut() {
            if request.buffer != buffer {
                continue;
            }
            if let Some(callback) = request.callback.take() {
                callback(MapReadStatus::Unknown, None);
            }
        }
    }

    pub fn pending(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

impl<M> Drop for MapReadTracker<M> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.inflight.is_empty(),
                "map read requests outlived their device"
            );
        }
    }
}
