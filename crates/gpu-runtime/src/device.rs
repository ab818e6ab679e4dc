//! Per-device completion bookkeeping.
//!
//! Native objects are released in two phases: a release first queues the
//! object with the serial of the submission currently being recorded, then
//! [`CompletionTracker::tick`] hands it back to the caller for destruction once
//! the GPU reports that serial as finished.

use std::ops::Range;

use tracing::debug;

use crate::map_read::{MapReadCallback, MapReadTracker};
use crate::objects::BufferId;
use crate::serial::{Serial, SerialQueue};

/// Last submitted and last completed serials of one device.
#[derive(Debug, Clone, Default)]
pub struct SubmissionTracker {
    last_submitted: Serial,
    last_completed: Serial,
}

impl SubmissionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serial the next submission will signal.
    pub fn pending_serial(&self) -> Serial {
        self.last_submitted.next()
    }

    pub fn last_submitted(&self) -> Serial {
        self.last_submitted
    }

    pub fn last_completed(&self) -> Serial {
        self.last_completed
    }

    /// Marks the pending serial as submitted and returns it.
    pub fn submitted(&mut self) -> Serial {
        self.last_submitted = self.last_submitted.next();
        self.last_submitted
    }

    /// Records GPU progress. Returns `false` when `completed` is not newer than
    /// what was already observed.
    pub fn update_completed(&mut self, completed: Serial) -> bool {
        debug_assert!(
            completed <= self.last_submitted,
            "serial {completed} completed before it was submitted (last submitted {})",
            self.last_submitted
        );
        if completed <= self.last_completed {
            return false;
        }
        self.last_completed = completed;
        true
    }

    pub fn is_idle(&self) -> bool {
        self.last_completed == self.last_submitted
    }
}

/// Native objects waiting for the GPU to finish with them.
#[derive(Debug)]
pub struct ReleaseQueue<O> {
    queue: SerialQueue<O>,
}

impl<O> Default for ReleaseQueue<O> {
    fn default() -> Self {
        Self {
            queue: SerialQueue::new(),
        }
    }
}

impl<O> ReleaseQueue<O> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&mut self, object: O, serial: Serial) {
        self.queue.enqueue(object, serial);
    }

    /// Hands every object released at or before `finished` to `destroy`.
    pub fn tick(&mut self, finished: Serial, mut destroy: impl FnMut(O)) -> usize {
        let mut destroyed = 0;
        for object in self.queue.drain_up_to(finished) {
            destroy(object);
            destroyed += 1;
        }
        destroyed
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<O> Drop for ReleaseQueue<O> {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            debug_assert!(
                self.queue.is_empty(),
                "{} native objects outlived their GPU fence",
                self.queue.len()
            );
        }
    }
}

/// Submission serials plus everything that waits on them: deferred native
/// object releases and map-read requests.
///
/// `O` is the native object type a backend destroys, `M` the host mapping a
/// map read exposes.
pub struct CompletionTracker<O, M> {
    serials: SubmissionTracker,
    releases: ReleaseQueue<O>,
    map_reads: MapReadTracker<M>,
}

impl<O, M: AsRef<[u8]>> Default for CompletionTracker<O, M> {
    fn default() -> Self {
        Self {
            serials: SubmissionTracker::new(),
            releases: ReleaseQueue::new(),
            map_reads: MapReadTracker::new(),
        }
    }
}

impl<O, M: AsRef<[u8]>> CompletionTracker<O, M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_serial(&self) -> Serial {
        self.serials.pending_serial()
    }

    pub fn last_submitted(&self) -> Serial {
        self.serials.last_submitted()
    }

    pub fn last_completed(&self) -> Serial {
        self.serials.last_completed()
    }

    pub fn submitted(&mut self) -> Serial {
        self.serials.submitted()
    }

    /// Queues `object` for destruction once the pending submission completes.
    pub fn release(&mut self, object: O) {
        let serial = self.serials.pending_serial();
        self.releases.release(object, serial);
    }

    pub fn track_map_read(
        &mut self,
        buffer: BufferId,
        request_serial: u32,
        mapping: M,
        range: Range<usize>,
        callback: MapReadCallback,
    ) {
        let serial = self.serials.pending_serial();
        self.map_reads
            .track(buffer, request_serial, mapping, range, callback, serial);
    }

    pub fn cancel_map_reads(&mut self, buffer: BufferId) {
        self.map_reads.cancel(buffer);
    }

    /// Processes everything that waited on serials `<= completed`.
    ///
    /// Map-read callbacks fire before released objects are destroyed. Ticking
    /// with a serial that was already processed does nothing.
    pub fn tick(&mut self, completed: Serial, destroy: impl FnMut(O)) -> bool {
        if !self.serials.update_completed(completed) {
            return false;
        }
        self.map_reads.tick(completed);
        let destroyed = self.releases.tick(completed, destroy);
        debug!(%completed, destroyed, "completion tick");
        true
    }

    pub fn pending_releases(&self) -> usize {
        self.releases.len()
    }

    pub fn pending_map_reads(&self) -> usize {
        self.map_reads.pending()
    }

    pub fn is_idle(&self) -> bool {
        self.serials.is_idle()
    }
}
