//! Interrupt-driven event queue.
//!
//! Events are produced by timer callbacks (the multiplex tick and the
//! per-device safety one-shots) and consumed by the main loop, which is
//! the only context allowed to touch devices, the pin pool or the
//! registry.
//!
//! ```text
//! ┌───────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Periodic timer│────▶│              │     │              │
//! │ One-shots     │────▶│  Event Queue │────▶│  Main Loop   │
//! │               │     │  (lock-free) │     │  (consumer)  │
//! └───────────────┘     └──────────────┘     └──────────────┘
//! ```
//!
//! Each slot is one `AtomicU32` holding an encoded event, so producers in
//! timer context never need a lock or a critical section.

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use crate::device::DeviceId;
use crate::safety::Generation;

/// Capacity of the global queue.  Power of 2 for cheap modulo.
pub const EVENT_QUEUE_CAP: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The periodic multiplex timer fired.
    MultiplexTick,
    /// The safety one-shot for a device fired; the generation names which
    /// arming it belongs to.
    SafetyTimeout(DeviceId, Generation),
}

// Slot layout: tag in bits 24..32, generation in 16..24, device id in 0..16.
const TAG_TICK: u32 = 1;
const TAG_SAFETY: u32 = 2;

impl Event {
    fn encode(self) -> u32 {
        match self {
            Self::MultiplexTick => TAG_TICK << 24,
            Self::SafetyTimeout(id, generation) => {
                (TAG_SAFETY << 24) | (u32::from(generation) << 16) | u32::from(id)
            }
        }
    }

    fn decode(raw: u32) -> Option<Self> {
        match raw >> 24 {
            TAG_TICK => Some(Self::MultiplexTick),
            TAG_SAFETY => Some(Self::SafetyTimeout(
                (raw & 0xFFFF) as DeviceId,
                ((raw >> 16) & 0xFF) as Generation,
            )),
            _ => None,
        }
    }
}

// ── Lock-free SPSC ring buffer ────────────────────────────────
//
// One producer (the esp_timer task, which runs every timer callback in
// turn) and one consumer (the main loop).  Head and tail are atomics; a
// slot is written before head is published with Release.

pub struct EventQueue<const N: usize> {
    head: AtomicUsize,
    tail: AtomicUsize,
    slots: [AtomicU32; N],
}

impl<const N: usize> EventQueue<N> {
    pub const fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            slots: [const { AtomicU32::new(0) }; N],
        }
    }

    /// Push from timer context.  Returns `false` if the queue is full
    /// (event dropped).
    pub fn push(&self, event: Event) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        let next = (head + 1) % N;
        if next == tail {
            return false;
        }
        self.slots[head].store(event.encode(), Ordering::Relaxed);
        self.head.store(next, Ordering::Release);
        true
    }

    /// Pop from the main loop.
    pub fn pop(&self) -> Option<Event> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        if tail == head {
            return None;
        }
        let raw = self.slots[tail].load(Ordering::Relaxed);
        self.tail.store((tail + 1) % N, Ordering::Release);
        Event::decode(raw)
    }

    /// Drain all pending events in FIFO order.
    pub fn drain(&self, mut handler: impl FnMut(Event)) {
        while let Some(event) = self.pop() {
            handler(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tail.load(Ordering::Relaxed) == self.head.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Relaxed);
        (head + N - tail) % N
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue the timer callbacks on the device push into.
static EVENTS: EventQueue<EVENT_QUEUE_CAP> = EventQueue::new();

/// Push an event into the global queue.  Safe to call from timer context.
pub fn push_event(event: Event) -> bool {
    EVENTS.push(event)
}

/// Drain the global queue.
pub fn drain_events(handler: impl FnMut(Event)) {
    EVENTS.drain(handler);
}
