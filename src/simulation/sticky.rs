//! Stickiness requests between particles and rigid body outlines.

use super::sort::{next_pow2, sort_sticky_requests};
use crate::compute::{AppendBuffer, Buffer, Dispatcher};
use crate::resources::StickyRequest;

/// Whether stickiness is evaluated on this substep: once every `interval` substeps, on the
/// last substep of each interval.
pub fn is_sticky_substep(global_substep: u64, interval: u32) -> bool {
    let interval = interval.max(1) as u64;
    global_substep % interval == interval - 1
}

/// Requests appended by the collision kernel and their particle-sorted copy.
pub struct StickyQueue {
    requests: AppendBuffer<StickyRequest>,
    sorted: Buffer<StickyRequest>,
    live: usize,
}

impl StickyQueue {
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            requests: AppendBuffer::with_capacity("Sticky Requests", capacity as usize),
            sorted: Buffer::filled(
                "Sorted Sticky Requests",
                next_pow2(capacity) as usize,
                StickyRequest::PADDING,
            ),
            live: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.requests.capacity()
    }

    /// Empty the queue before a stickiness substep.
    pub fn reset(&mut self) {
        self.requests.reset_counter();
        self.live = 0;
    }

    pub fn requests(&self) -> &AppendBuffer<StickyRequest> {
        &self.requests
    }

    /// Requests that did not fit since the last reset.
    pub fn dropped(&self) -> u32 {
        self.requests.dropped()
    }

    /// Sort the appended requests by particle. Returns the live count.
    pub fn sort(&mut self, dispatcher: &mut Dispatcher) -> usize {
        self.live = sort_sticky_requests(dispatcher, &self.requests, &mut self.sorted);
        self.live
    }

    /// Live requests in particle order, valid after [`StickyQueue::sort`].
    pub fn sorted(&self) -> &[StickyRequest] {
        &self.sorted.as_slice()[..self.live]
    }
}
