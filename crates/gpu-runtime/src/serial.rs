use std::collections::VecDeque;
use std::fmt;

/// Point in GPU submission order.
///
/// Completion of serial `N` implies completion of every serial `<= N`. Serial 0
/// means "nothing submitted yet".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Serial(pub u64);

impl Serial {
    pub const ZERO: Serial = Serial(0);

    pub fn next(self) -> Serial {
        Serial(self.0 + 1)
    }
}

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Ordered queue of items tagged with the serial after which they may be
/// processed.
///
/// Serials must be enqueued in non-decreasing order. Owners pair
/// [`SerialQueue::iterate_up_to`] with [`SerialQueue::clear_up_to`] when they tick
/// so callbacks can observe items before they are removed.
#[derive(Debug)]
pub struct SerialQueue<T> {
    storage: VecDeque<(Serial, T)>,
}

impl<T> Default for SerialQueue<T> {
    fn default() -> Self {
        Self {
            storage: VecDeque::new(),
        }
    }
}

impl<T> SerialQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, item: T, serial: Serial) {
        debug_assert!(
            self.last_serial().map_or(true, |last| last <= serial),
            "serial {serial} enqueued after {:?}",
            self.last_serial()
        );
        self.storage.push_back((serial, item));
    }

    /// Items whose serial is `<= serial`, in enqueue order.
    ///
    /// Non-destructive: calling it again yields the same items until
    /// [`SerialQueue::clear_up_to`] removes them.
    pub fn iterate_up_to(&self, serial: Serial) -> impl Iterator<Item = &T> + '_ {
        self.storage
            .iter()
            .take_while(move |(s, _)| *s <= serial)
            .map(|(_, item)| item)
    }

    pub fn iterate_up_to_mut(&mut self, serial: Serial) -> impl Iterator<Item = &mut T> + '_ {
        self.storage
            .iter_mut()
            .take_while(move |(s, _)| *s <= serial)
            .map(|(_, item)| item)
    }

    /// Iterates every item regardless of serial.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.storage.iter().map(|(_, item)| item)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.storage.iter_mut().map(|(_, item)| item)
    }

    pub fn clear_up_to(&mut self, serial: Serial) {
        let count = self.count_up_to(serial);
        self.storage.drain(..count);
    }

    /// Removes and yields the items whose serial is `<= serial`.
    pub fn drain_up_to(&mut self, serial: Serial) -> impl Iterator<Item = T> + '_ {
        let count = self.count_up_to(serial);
        self.storage.drain(..count).map(|(_, item)| item)
    }

    pub fn first_serial(&self) -> Option<Serial> {
        self.storage.front().map(|(s, _)| *s)
    }

    pub fn last_serial(&self) -> Option<Serial> {
        self.storage.back().map(|(s, _)| *s)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    fn count_up_to(&self, serial: Serial) -> usize {
        // Sorted by serial, so the ready items form a prefix.
        self.storage.partition_point(|(s, _)| *s <= serial)
    }
}
