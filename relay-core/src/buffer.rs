use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;

/// A segmented buffer optimized for zero-copy operations.
///
/// This buffer holds multiple `Bytes` segments and provides efficient
/// extraction without unnecessary copies. When data is requested and
/// fits within a single segment, it can be returned with zero copies
/// (just a refcount increment on the underlying `Bytes`).
///
/// # Use Cases
///
/// - Protocol decoders reading frames from streaming data
/// - Minimizing memcpy overhead for small messages (< 8KB)
/// - Preserving arena-allocated buffer segments through the pipeline
///
/// # Tradeoffs
///
/// - **Fast path**: Single-segment extraction is O(1) with no copy
/// - **Slow path**: Multi-segment extraction requires copying into contiguous buffer
/// - For large messages spanning many reads, the copy cost is unavoidable
#[derive(Debug, Default, Clone)]
pub struct SegmentedBuffer {
    segs: VecDeque<Bytes>,
    len: usize,
}

impl SegmentedBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            segs: VecDeque::new(),
            len: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn push(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        self.len += bytes.len();
        self.segs.push_back(bytes);
    }

    /// Copy the first `n` bytes into `dst`.
    ///
    /// Returns `false` if fewer than `n` bytes are available.
    pub fn copy_prefix(&self, n: usize, dst: &mut [u8]) -> bool {
        if n > self.len || dst.len() < n {
            return false;
        }

        let mut remaining = n;
        let mut out_off = 0;
        for seg in &self.segs {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(seg.len());
            dst[out_off..out_off + take].copy_from_slice(&seg[..take]);
            out_off += take;
            remaining -= take;
        }
        true
    }

    /// Advance the queue by `n` bytes, dropping fully-consumed segments.
    ///
    /// # Panics
    ///
    /// Panics if `n > self.len`.
    pub fn advance(&mut self, mut n: usize) {
        assert!(n <= self.len);
        self.len -= n;

        while n > 0 {
            let Some(mut front) = self.segs.pop_front() else {
                break;
            };
            if n >= front.len() {
                n -= front.len();
                continue;
            }
            // partially consumed
            front.advance(n);
            self.segs.push_front(front);
            break;
        }
    }

    /// Take exactly `n` bytes from the front of the queue.
    ///
    /// If the first segment contains all `n` bytes, this is zero-copy.
    /// If the bytes span multiple segments, this copies into a contiguous buffer.
    pub fn take_bytes(&mut self, n: usize) -> Option<Bytes> {
        if n == 0 {
            return Some(Bytes::new());
        }
        if n > self.len {
            return None;
        }

        let Some(front) = self.segs.front_mut() else {
            return None;
        };

        if front.len() >= n {
            self.len -= n;
            let out = front.split_to(n);
            if front.is_empty() {
                self.segs.pop_front();
            }
            return Some(out);
        }

        // Spans segments: copy.
        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        while remaining > 0 {
            let seg = self.segs.pop_front().expect("len check ensures segments exist");
            let take = remaining.min(seg.len());
            out.extend_from_slice(&seg[..take]);
            remaining -= take;
            self.len -= take;
            if take < seg.len() {
                let mut rest = seg;
                rest.advance(take);
                self.segs.push_front(rest);
            }
        }

        Some(out.freeze())
    }

    /// Find the offset of the first occurrence of `byte`, scanning across
    /// segment boundaries.
    ///
    /// Used by the framer to locate NUL terminators without requiring the
    /// whole buffered stream to be contiguous.
    #[must_use]
    pub fn position_of(&self, byte: u8) -> Option<usize> {
        let mut offset = 0;
        for seg in &self.segs {
            if let Some(idx) = seg.iter().position(|b| *b == byte) {
                return Some(offset + idx);
            }
            offset += seg.len();
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_len() {
        let mut buf = SegmentedBuffer::new();
        buf.push(Bytes::from_static(b"abc"));
        buf.push(Bytes::from_static(b"de"));
        assert_eq!(buf.len(), 5);
        assert!(!buf.is_empty());
    }

    #[test]
    fn take_bytes_within_one_segment() {
        let mut buf = SegmentedBuffer::new();
        buf.push(Bytes::from_static(b"hello"));
        let out = buf.take_bytes(3).unwrap();
        assert_eq!(&out[..], b"hel");
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn take_bytes_spanning_segments() {
        let mut buf = SegmentedBuffer::new();
        buf.push(Bytes::from_static(b"ab"));
        buf.push(Bytes::from_static(b"cd"));
        buf.push(Bytes::from_static(b"ef"));
        let out = buf.take_bytes(5).unwrap();
        assert_eq!(&out[..], b"abcde");
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn advance_drops_consumed_segments() {
        let mut buf = SegmentedBuffer::new();
        buf.push(Bytes::from_static(b"abc"));
        buf.push(Bytes::from_static(b"def"));
        buf.advance(4);
        assert_eq!(buf.len(), 2);
        let out = buf.take_bytes(2).unwrap();
        assert_eq!(&out[..], b"ef");
    }

    #[test]
    fn position_of_finds_terminator_across_segments() {
        let mut buf = SegmentedBuffer::new();
        buf.push(Bytes::from_static(b"HEL"));
        buf.push(Bytes::from_static(b"LO\0WORLD"));
        assert_eq!(buf.position_of(0), Some(5));
    }

    #[test]
    fn position_of_none_when_absent() {
        let mut buf = SegmentedBuffer::new();
        buf.push(Bytes::from_static(b"no terminator here"));
        assert_eq!(buf.position_of(0), None);
    }

    #[test]
    fn copy_prefix_requires_enough_data() {
        let mut buf = SegmentedBuffer::new();
        buf.push(Bytes::from_static(b"ab"));
        let mut dst = [0u8; 4];
        assert!(!buf.copy_prefix(4, &mut dst));
        assert!(buf.copy_prefix(2, &mut dst[..2]));
        assert_eq!(&dst[..2], b"ab");
    }
}
