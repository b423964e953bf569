//! A single-producer, single-consumer (SPSC) lock-free byte queue over caller-provided storage.

use core::{
    cell::UnsafeCell,
    slice,
    sync::atomic::{AtomicUsize, Ordering},
};

/// A circular byte queue storing up to `storage.len()` bytes.
///
/// The queue never owns its memory: the storage slice is borrowed for the whole lifetime of the
/// queue and is neither resized nor released by it. It is used through the [`Producer`] and
/// [`Consumer`] halves returned by [`RingBuffer::split`], which may live in different execution
/// contexts (an interrupt handler and the main loop) and synchronize through the two atomic
/// cursors only.
///
/// The cursors run over `0..2 * capacity`, so "full" (`write - read == capacity`) and "empty"
/// (`write == read`) are distinct states and every byte of `storage` is usable.
pub struct RingBuffer<'a> {
    /// Where the next pop starts, modulo `capacity`. Only the [`Consumer`] stores to it.
    ///
    /// The RingBuffer always guarantees `read < 2 * capacity` (or `read == 0` if empty storage).
    read: AtomicUsize,
    /// Where the next push lands, modulo `capacity`. Only the [`Producer`] stores to it.
    ///
    /// The RingBuffer always guarantees `write < 2 * capacity` (or `write == 0` if empty storage).
    write: AtomicUsize,
    buf: &'a [UnsafeCell<u8>],
}

/// Writes bytes into the queue.
pub struct Producer<'a> {
    read: &'a AtomicUsize,
    write: &'a AtomicUsize,
    buf: &'a [UnsafeCell<u8>],
}

/// Reads bytes previously written to the queue.
pub struct Consumer<'a> {
    read: &'a AtomicUsize,
    write: &'a AtomicUsize,
    buf: &'a [UnsafeCell<u8>],
}

// SAFETY: Producer can be safely sent to another thread because:
// - Only one Producer exists per queue (single-producer invariant enforced by split())
// - It only stores to `write`, and only writes the slot at `write`, which the Consumer does not
//   read until the Release store of the new `write` publishes it
unsafe impl Send for Producer<'_> {}

// SAFETY: Consumer can be safely sent to another thread because:
// - Only one Consumer exists per queue (single-consumer invariant enforced by split())
// - It only stores to `read`, and only reads slots in `read..write`, which the Producer does not
//   write until the Release store of the new `read` hands them back
unsafe impl Send for Consumer<'_> {}

/// Bytes between `read` and `write` on a ring of `capacity`.
#[inline]
fn occupied(read: usize, write: usize, capacity: usize) -> usize {
    if write >= read {
        write - read
    } else {
        write + 2 * capacity - read
    }
}

/// Storage slot addressed by a cursor.
#[inline]
fn slot(cursor: usize, capacity: usize) -> usize {
    if cursor >= capacity {
        cursor - capacity
    } else {
        cursor
    }
}

/// The cursor following `cursor`.
#[inline]
fn advance(cursor: usize, capacity: usize) -> usize {
    let next = cursor + 1;
    if next == 2 * capacity { 0 } else { next }
}

impl<'a> RingBuffer<'a> {
    /// Binds an empty queue to `storage`.
    ///
    /// The contents of `storage` are left untouched; stale bytes are unreachable until
    /// overwritten by [`Producer::push`]. Empty storage is accepted and yields a queue on which
    /// every push and pop fails.
    pub fn new(storage: &'a mut [u8]) -> Self {
        let len = storage.len();
        // SAFETY:
        // - `UnsafeCell<u8>` is `repr(transparent)` over `u8`, so layout and validity match.
        // - The exclusive borrow of `storage` is held for `'a`, so nothing else can observe the
        //   bytes while we hand out shared `UnsafeCell` views; writes go through `UnsafeCell`.
        let buf: &[UnsafeCell<u8>] =
            unsafe { slice::from_raw_parts(storage.as_mut_ptr().cast(), len) };
        Self {
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            buf,
        }
    }

    /// Total number of bytes the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Empties the queue and splits it into its producer and consumer halves.
    ///
    /// Taking `&mut self` guarantees there is only one of each for as long as they live.
    #[inline]
    pub fn split(&mut self) -> (Producer<'_>, Consumer<'_>) {
        *self.read.get_mut() = 0;
        *self.write.get_mut() = 0;
        let (read, write, buf) = (&self.read, &self.write, self.buf);
        (
            Producer { read, write, buf },
            Consumer { read, write, buf },
        )
    }
}

impl Producer<'_> {
    /// Total number of bytes the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes waiting to be popped.
    ///
    /// May overestimate while the consumer is popping concurrently.
    #[inline]
    pub fn len(&self) -> usize {
        // Acquire: pairs with the consumer's Release store of `read`.
        let read = self.read.load(Ordering::Acquire);
        // Relaxed: producer owns `write`.
        let write = self.write.load(Ordering::Relaxed);
        occupied(read, write, self.capacity())
    }

    /// Returns `true` if nothing is waiting to be popped.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How much space is left in the buffer?
    #[inline]
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Returns `true` if the next push would fail.
    #[inline]
    pub fn is_full(&self) -> bool {
        self.free() == 0
    }

    /// Appends `byte` at the tail.
    ///
    /// Returns `false` and leaves the queue untouched if it is full.
    #[inline]
    pub fn push(&mut self, byte: u8) -> bool {
        let capacity = self.capacity();
        // Acquire: the consumer is done reading every slot before `read` once we see it.
        let read = self.read.load(Ordering::Acquire);
        // Relaxed: producer owns `write`, no cross-thread synchronization needed.
        let write = self.write.load(Ordering::Relaxed);
        if occupied(read, write, capacity) == capacity {
            return false;
        }

        // SAFETY:
        // - In bounds: `write < 2 * capacity` by field invariant, so `slot(..) < capacity`, and
        //   `capacity > 0` here because the queue was not full.
        // - No data race: the queue is not full, so the slot at `write` is outside
        //   `read..write` and owned by the producer. The consumer won't read it before the
        //   Release store below.
        unsafe { *self.buf[slot(write, capacity)].get() = byte };

        // Release: publishes the byte written above.
        self.write
            .store(advance(write, capacity), Ordering::Release);
        true
    }
}

impl Consumer<'_> {
    /// Total number of bytes the queue can hold.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of bytes waiting to be popped.
    ///
    /// May underestimate while the producer is pushing concurrently.
    #[inline]
    pub fn len(&self) -> usize {
        // Relaxed: consumer owns `read`.
        let read = self.read.load(Ordering::Relaxed);
        // Acquire: synchronizes with producer's Release store to see written data.
        let write = self.write.load(Ordering::Acquire);
        occupied(read, write, self.capacity())
    }

    /// Returns `true` if there is no data available to pop.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes the byte at the head.
    ///
    /// Returns `None` and leaves the queue untouched if it is empty.
    #[inline]
    pub fn pop(&mut self) -> Option<u8> {
        let capacity = self.capacity();
        // Relaxed: consumer owns `read`, no cross-thread synchronization needed.
        let read = self.read.load(Ordering::Relaxed);
        // Acquire: synchronizes with producer's Release store, ensuring we see the written data.
        let write = self.write.load(Ordering::Acquire);
        if read == write {
            return None;
        }

        // SAFETY:
        // - In bounds: `read < 2 * capacity` by field invariant, and `capacity > 0` because the
        //   queue is not empty.
        // - No data race: the slot at `read` lies in `read..write`, which the producer has
        //   published and won't touch again until the Release store below.
        let byte = unsafe { *self.buf[slot(read, capacity)].get() };

        // Release: hands the slot back to the producer.
        self.read.store(advance(read, capacity), Ordering::Release);
        Some(byte)
    }

    /// Discards all queued bytes.
    ///
    /// Bytes pushed concurrently with the call may survive it.
    #[inline]
    pub fn clear(&mut self) {
        let write = self.write.load(Ordering::Acquire);
        self.read.store(write, Ordering::Release);
    }
}

#[cfg(test)]
mod test {

    use super::*;

    extern crate std;

    const BUF_SIZE: usize = 4;

    /// Snapshot of the cursors, for "no mutation" assertions.
    fn cursors(p: &Producer<'_>) -> (usize, usize) {
        (
            p.read.load(Ordering::Relaxed),
            p.write.load(Ordering::Relaxed),
        )
    }

    #[test]
    fn push_pop() {
        let mut storage = [0; BUF_SIZE];
        let mut r = RingBuffer::new(&mut storage);
        let (mut p, mut c) = r.split();
        assert!(p.push(b'A'));
        assert!(p.push(b'B'));
        assert_eq!(c.pop(), Some(b'A'));
        assert_eq!(c.pop(), Some(b'B'));
        assert_eq!(c.pop(), None);
    }

    #[test]
    fn fresh_buffer_is_empty() {
        let mut storage = [0xff; BUF_SIZE];
        let mut r = RingBuffer::new(&mut storage);
        assert_eq!(r.capacity(), BUF_SIZE);
        let (p, c) = r.split();
        assert!(c.is_empty());
        assert!(!p.is_full());
        assert_eq!(c.len(), 0);
        assert_eq!(p.free(), BUF_SIZE);
    }

    #[test]
    fn overfill() {
        let mut storage = [0; 2];
        let mut r = RingBuffer::new(&mut storage);
        let (mut p, mut c) = r.split();
        assert!(p.push(1));
        assert!(p.push(2));
        assert!(p.is_full());

        let before = cursors(&p);
        assert!(!p.push(3));
        assert_eq!(cursors(&p), before);

        assert_eq!(c.pop(), Some(1));
        assert_eq!(c.pop(), Some(2));
    }

    #[test]
    fn pop_empty_leaves_state() {
        let mut storage = [0; BUF_SIZE];
        let mut r = RingBuffer::new(&mut storage);
        let (mut p, mut c) = r.split();
        assert!(p.push(7));
        assert_eq!(c.pop(), Some(7));

        let before = cursors(&p);
        assert_eq!(c.pop(), None);
        assert_eq!(cursors(&p), before);
    }

    #[test]
    fn fifo_order_across_wrap() {
        let mut storage = [0; BUF_SIZE];
        let mut r = RingBuffer::new(&mut storage);
        let (mut p, mut c) = r.split();

        // Walk the cursors around more than once so both storage and cursor wrap are crossed.
        for round in 0..3u8 {
            for b in 0..(BUF_SIZE as u8 - 1) {
                assert!(p.push(b));
                assert_eq!(c.pop(), Some(b));
            }
            for b in 0..BUF_SIZE as u8 {
                assert!(p.push(round * 10 + b));
            }
            assert!(p.is_full());
            for b in 0..BUF_SIZE as u8 {
                assert_eq!(c.pop(), Some(round * 10 + b));
            }
            assert!(c.is_empty());
        }
    }

    #[test]
    fn len_stays_bounded_under_interleaving() {
        let mut storage = [0; 3];
        let mut r = RingBuffer::new(&mut storage);
        let (mut p, mut c) = r.split();
        let mut next_in = 0u8;
        let mut next_out = 0u8;

        // Deterministic mix of bursts of pushes and pops.
        for step in 0..200usize {
            if step % 7 < 4 {
                if p.push(next_in) {
                    next_in = next_in.wrapping_add(1);
                }
            } else if let Some(b) = c.pop() {
                assert_eq!(b, next_out);
                next_out = next_out.wrapping_add(1);
            }
            assert!(c.len() <= c.capacity());
            assert_eq!(p.len() + p.free(), p.capacity());
            let (read, write) = cursors(&p);
            assert!(read < 2 * p.capacity());
            assert!(write < 2 * p.capacity());
        }
    }

    #[test]
    fn clear_discards() {
        let mut storage = [0; BUF_SIZE];
        let mut r = RingBuffer::new(&mut storage);
        let (mut p, mut c) = r.split();
        assert!(p.push(1));
        assert!(p.push(2));
        c.clear();
        assert!(c.is_empty());
        assert_eq!(p.free(), BUF_SIZE);
        assert_eq!(c.pop(), None);
        assert!(p.push(3));
        assert_eq!(c.pop(), Some(3));
    }

    #[test]
    fn split_starts_empty() {
        let mut storage = [0; BUF_SIZE];
        let mut r = RingBuffer::new(&mut storage);
        {
            let (mut p, _) = r.split();
            assert!(p.push(1));
        }
        let (_, c) = r.split();
        assert!(c.is_empty());
    }

    #[test]
    fn zero_capacity() {
        let mut storage = [0u8; 0];
        let mut r = RingBuffer::new(&mut storage);
        let (mut p, mut c) = r.split();
        assert!(c.is_empty());
        assert!(p.is_full());
        assert!(!p.push(1));
        assert_eq!(c.pop(), None);
        assert_eq!(p.free(), 0);
    }

    #[test]
    fn producer_and_consumer_on_separate_threads() {
        const COUNT: usize = 100_000;
        let mut storage = [0; 7];
        let mut r = RingBuffer::new(&mut storage);
        let (mut p, mut c) = r.split();

        std::thread::scope(|s| {
            s.spawn(move || {
                let mut i = 0;
                while i < COUNT {
                    if p.push(i as u8) {
                        i += 1;
                    }
                }
            });
            s.spawn(move || {
                let mut i = 0;
                while i < COUNT {
                    if let Some(b) = c.pop() {
                        assert_eq!(b, i as u8);
                        i += 1;
                    }
                }
            });
        });
    }
}
