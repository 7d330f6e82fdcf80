//! Lock-free SPSC ring buffer with the mandatory two-segment write-vector
//! contract required by the capture engine (§4.4, §9): a writer must be
//! able to see up to two contiguous runs (the tail of the buffer and the
//! wrapped-around head) rather than being forced to write one frame at a
//! time across the wrap boundary.
//!
//! Grounded in the teacher's `processing::ring_buffer::RingBuffer`, which
//! covers the same "reader/writer over a fixed capacity, overflow drops
//! oldest data" shape but only exposes a single contiguous push/pop pair
//! over `f32` samples. This version operates on raw frames of
//! `frame_size` bytes (WASAPI streams are not forced to float) and adds
//! the two-segment write/read vectors the capture record loop needs.

use std::sync::atomic::{AtomicUsize, Ordering};

/// A contiguous run available for writing: `buf` is a byte slice of
/// `len` frames capacity (i.e. `buf.len() == len * frame_size`).
pub struct WriteSegment<'a> {
    pub buf: &'a mut [u8],
    pub len: usize,
}

/// The two-segment view returned by `write_vector`. `second` is only
/// non-empty when the first segment runs up against the end of the
/// underlying storage and wraps.
pub struct WriteVector<'a> {
    pub first: WriteSegment<'a>,
    pub second: WriteSegment<'a>,
}

/// The ring buffer contract consumed by the capture engine. A concrete
/// implementation need not be lock-free, but must honor the two-segment
/// write contract and never block.
pub trait RingBuffer: Send + Sync {
    /// Frame capacity (not byte capacity).
    fn capacity(&self) -> usize;

    /// Frames immediately available to write without blocking, split
    /// across up to two contiguous segments.
    fn write_vector(&mut self) -> WriteVector<'_>;

    /// Commit `frames` written via the vector returned by the most recent
    /// `write_vector` call.
    fn write_advance(&mut self, frames: usize);

    /// Copy up to `frames` frames into `dst` (`dst.len() >= frames *
    /// frame_size`), returning the number of frames actually copied.
    fn read(&mut self, dst: &mut [u8], frames: usize) -> usize;

    /// Frames available to read without blocking.
    fn read_space(&self) -> usize;
}

/// Single-producer single-consumer ring buffer over raw frames, sized in
/// bytes as `capacity_frames * frame_size`. Capacity is rounded up to the
/// next power of two, matching the original's `RingBuffer::Create`.
pub struct SpscRingBuffer {
    storage: Vec<u8>,
    frame_size: usize,
    capacity_frames: usize,
    mask: usize,
    write_pos: AtomicUsize,
    read_pos: AtomicUsize,
}

impl SpscRingBuffer {
    pub fn new(capacity_frames: usize, frame_size: usize) -> Self {
        let capacity_frames = capacity_frames.next_power_of_two().max(1);
        Self {
            storage: vec![0u8; capacity_frames * frame_size],
            frame_size,
            capacity_frames,
            mask: capacity_frames - 1,
            write_pos: AtomicUsize::new(0),
            read_pos: AtomicUsize::new(0),
        }
    }

    fn used(&self) -> usize {
        self.write_pos.load(Ordering::Acquire) - self.read_pos.load(Ordering::Acquire)
    }
}

impl RingBuffer for SpscRingBuffer {
    fn capacity(&self) -> usize {
        self.capacity_frames
    }

    fn write_vector(&mut self) -> WriteVector<'_> {
        let write_pos = self.write_pos.load(Ordering::Relaxed);
        let read_pos = self.read_pos.load(Ordering::Acquire);
        let free = self.capacity_frames - (write_pos - read_pos);
        let write_index = write_pos & self.mask;
        let frame_size = self.frame_size;
        let first_len = free.min(self.capacity_frames - write_index);
        let second_len = free - first_len;

        let write_offset = write_index * frame_size;
        let (first_slice, rest) = self.storage.split_at_mut(write_offset + first_len * frame_size);
        let first_buf = &mut first_slice[write_offset..];
        let second_buf = &mut rest[..second_len * frame_size];

        WriteVector {
            first: WriteSegment { buf: first_buf, len: first_len },
            second: WriteSegment { buf: second_buf, len: second_len },
        }
    }

    fn write_advance(&mut self, frames: usize) {
        self.write_pos.fetch_add(frames, Ordering::Release);
    }

    fn read(&mut self, dst: &mut [u8], frames: usize) -> usize {
        let frame_size = self.frame_size;
        let available = self.read_space();
        let to_read = frames.min(available);
        let read_pos = self.read_pos.load(Ordering::Relaxed);
        let read_index = read_pos & self.mask;
        let first_len = to_read.min(self.capacity_frames - read_index);
        let second_len = to_read - first_len;

        let src_offset = read_index * frame_size;
        dst[..first_len * frame_size].copy_from_slice(&self.storage[src_offset..src_offset + first_len * frame_size]);
        if second_len > 0 {
            dst[first_len * frame_size..to_read * frame_size]
                .copy_from_slice(&self.storage[..second_len * frame_size]);
        }

        self.read_pos.fetch_add(to_read, Ordering::Release);
        to_read
    }

    fn read_space(&self) -> usize {
        self.used()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: usize = 4;

    #[test]
    fn basic_write_read() {
        let mut rb = SpscRingBuffer::new(8, FRAME);
        {
            let mut vec = rb.write_vector();
            assert!(vec.first.len >= 3);
            vec.first.buf[..FRAME * 3].copy_from_slice(&[1; FRAME * 3]);
        }
        rb.write_advance(3);
        assert_eq!(rb.read_space(), 3);

        let mut dst = vec![0u8; FRAME * 3];
        let got = rb.read(&mut dst, 3);
        assert_eq!(got, 3);
        assert_eq!(dst, vec![1u8; FRAME * 3]);
        assert_eq!(rb.read_space(), 0);
    }

    #[test]
    fn capacity_rounds_up_to_power_of_two() {
        let rb = SpscRingBuffer::new(5, FRAME);
        assert_eq!(rb.capacity(), 8);
    }

    #[test]
    fn write_vector_splits_across_wrap() {
        let mut rb = SpscRingBuffer::new(8, FRAME);
        // Fill 6 frames, drain 6, leaving write cursor at index 6 (mod 8).
        {
            let mut vec = rb.write_vector();
            for i in 0..6 {
                vec.first.buf[i * FRAME..(i + 1) * FRAME].copy_from_slice(&[2; FRAME]);
            }
        }
        rb.write_advance(6);
        let mut sink = vec![0u8; FRAME * 6];
        rb.read(&mut sink, 6);

        // Now write 4 more: should wrap, giving a two-segment vector.
        let vec = rb.write_vector();
        assert_eq!(vec.first.len + vec.second.len, 8);
        assert!(vec.second.len > 0);
    }

    #[test]
    fn read_partial_when_less_available_than_requested() {
        let mut rb = SpscRingBuffer::new(8, FRAME);
        {
            let mut vec = rb.write_vector();
            vec.first.buf[..FRAME * 2].copy_from_slice(&[3; FRAME * 2]);
        }
        rb.write_advance(2);
        let mut dst = vec![0u8; FRAME * 5];
        let got = rb.read(&mut dst, 5);
        assert_eq!(got, 2);
    }

    #[test]
    fn empty_buffer_has_no_read_space() {
        let rb = SpscRingBuffer::new(8, FRAME);
        assert_eq!(rb.read_space(), 0);
    }

    #[test]
    fn write_vector_reports_zero_free_when_full() {
        let mut rb = SpscRingBuffer::new(4, FRAME);
        {
            let mut vec = rb.write_vector();
            assert_eq!(vec.first.len, 4);
        }
        rb.write_advance(4);
        let vec = rb.write_vector();
        assert_eq!(vec.first.len, 0);
        assert_eq!(vec.second.len, 0);
    }
}
