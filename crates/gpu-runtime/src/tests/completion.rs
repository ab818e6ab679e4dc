use std::cell::RefCell;
use std::rc::Rc;

use crate::device::{CompletionTracker, ReleaseQueue, SubmissionTracker};
use crate::map_read::{MapReadCallback, MapReadStatus};
use crate::objects::BufferId;
use crate::serial::Serial;

type Results = Rc<RefCell<Vec<(MapReadStatus, Option<Vec<u8>>)>>>;

fn recording_callback(results: &Results) -> MapReadCallback {
    let results = Rc::clone(results);
    Box::new(move |status: MapReadStatus, data: Option<&[u8]>| {
        results
            .borrow_mut()
            .push((status, data.map(<[u8]>::to_vec)));
    })
}

#[test]
fn pending_serial_is_one_past_last_submitted() {
    let mut serials = SubmissionTracker::new();
    assert_eq!(serials.pending_serial(), Serial(1));
    assert!(serials.is_idle());

    assert_eq!(serials.submitted(), Serial(1));
    assert_eq!(serials.submitted(), Serial(2));
    assert_eq!(serials.pending_serial(), Serial(3));
    assert!(!serials.is_idle());

    assert!(serials.update_completed(Serial(1)));
    assert!(!serials.update_completed(Serial(1)), "stale completion is ignored");
    assert!(serials.update_completed(Serial(2)));
    assert!(serials.is_idle());
}

#[test]
fn released_objects_wait_for_their_serial() {
    let mut queue = ReleaseQueue::new();
    queue.release("a", Serial(1));
    queue.release("b", Serial(2));

    let mut destroyed = Vec::new();
    assert_eq!(queue.tick(Serial(1), |object| destroyed.push(object)), 1);
    assert_eq!(destroyed, vec!["a"]);
    assert_eq!(queue.len(), 1);

    assert_eq!(queue.tick(Serial(2), |object| destroyed.push(object)), 1);
    assert_eq!(destroyed, vec!["a", "b"]);
    assert!(queue.is_empty());
}

#[test]
fn release_uses_the_pending_serial() {
    let mut tracker = CompletionTracker::<u32, Vec<u8>>::new();
    tracker.release(10);
    let first = tracker.submitted();
    tracker.release(11);

    let mut destroyed = Vec::new();
    assert!(tracker.tick(first, |object| destroyed.push(object)));
    assert_eq!(destroyed, vec![10]);
    assert_eq!(tracker.pending_releases(), 1);

    let second = tracker.submitted();
    assert!(tracker.tick(second, |object| destroyed.push(object)));
    assert_eq!(destroyed, vec![10, 11]);
    assert!(tracker.is_idle());
}

#[test]
fn map_read_fires_only_after_its_serial_completes() {
    let results = Results::default();
    let mut tracker = CompletionTracker::<u32, Vec<u8>>::new();

    let first = tracker.submitted();
    tracker.track_map_read(
        BufferId(1),
        0,
        vec![1, 2, 3, 4, 5],
        1..4,
        recording_callback(&results),
    );
    let second = tracker.submitted();

    tracker.tick(first, |_| {});
    assert!(results.borrow().is_empty());
    assert_eq!(tracker.pending_map_reads(), 1);

    tracker.tick(second, |_| {});
    assert_eq!(
        *results.borrow(),
        vec![(MapReadStatus::Success, Some(vec![2, 3, 4]))]
    );
    assert_eq!(tracker.pending_map_reads(), 0);
}

#[test]
fn map_read_out_of_range_reports_error() {
    let results = Results::default();
    let mut tracker = CompletionTracker::<u32, Vec<u8>>::new();
    tracker.track_map_read(BufferId(1), 0, vec![0; 4], 2..8, recording_callback(&results));
    let serial = tracker.submitted();
    tracker.tick(serial, |_| {});
    assert_eq!(*results.borrow(), vec![(MapReadStatus::Error, None)]);
}

#[test]
fn cancelled_map_read_reports_unknown_once() {
    let results = Results::default();
    let mut tracker = CompletionTracker::<u32, Vec<u8>>::new();
    tracker.track_map_read(BufferId(1), 0, vec![0; 4], 0..4, recording_callback(&results));
    tracker.track_map_read(BufferId(2), 1, vec![7; 4], 0..2, recording_callback(&results));

    tracker.cancel_map_reads(BufferId(1));
    assert_eq!(*results.borrow(), vec![(MapReadStatus::Unknown, None)]);

    // The cancelled request holds its mapping until the serial passes.
    assert_eq!(tracker.pending_map_reads(), 2);
    let serial = tracker.submitted();
    tracker.tick(serial, |_| {});
    assert_eq!(
        *results.borrow(),
        vec![
            (MapReadStatus::Unknown, None),
            (MapReadStatus::Success, Some(vec![7, 7])),
        ]
    );
    assert_eq!(tracker.pending_map_reads(), 0);
}

#[test]
fn callbacks_run_before_released_objects_are_destroyed() {
    let order = Rc::new(RefCell::new(Vec::new()));
    let mut tracker = CompletionTracker::<&'static str, Vec<u8>>::new();

    let log = Rc::clone(&order);
    tracker.track_map_read(
        BufferId(1),
        0,
        vec![0; 4],
        0..4,
        Box::new(move |_: MapReadStatus, _: Option<&[u8]>| {
            log.borrow_mut().push("map read")
        }),
    );
    tracker.release("buffer");
    let serial = tracker.submitted();
    tracker.tick(serial, |object| order.borrow_mut().push(object));

    assert_eq!(*order.borrow(), vec!["map read", "buffer"]);
}
