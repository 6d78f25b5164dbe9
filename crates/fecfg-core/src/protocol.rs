//! Chunked register-space transfers over an addressed bus
//!
//! The physical link caps payload size, so a register space moves as a walk
//! of bounded frames: each chunk is at most the transport's maximum frame
//! length and the last chunk is exactly the remainder. An optional
//! inter-chunk delay respects link timing; it is routed through the
//! transport so emulators can elide the wait.

use std::time::Duration;

use crate::link::{BusTransport, LinkError, LinkResult};

/// Write a contiguous register range in bounded chunks
pub fn write_space<T: BusTransport + ?Sized>(
    link: &mut T,
    base: u16,
    bytes: &[u8],
    inter_chunk_delay: Duration,
) -> LinkResult<()> {
    let max_len = link.max_frame_len().max(1);
    let mut offset = 0usize;

    while offset < bytes.len() {
        let chunk_len = core::cmp::min(max_len, bytes.len() - offset);
        let start = base + offset as u16;
        log::trace!("writing {} bytes at register {:#06x}", chunk_len, start);
        link.write_frame(start, &bytes[offset..offset + chunk_len])?;
        offset += chunk_len;
        if offset < bytes.len() && !inter_chunk_delay.is_zero() {
            link.delay(inter_chunk_delay);
        }
    }

    Ok(())
}

/// Read a contiguous register range back in bounded chunks
pub fn read_space<T: BusTransport + ?Sized>(
    link: &mut T,
    base: u16,
    len: usize,
    inter_chunk_delay: Duration,
) -> LinkResult<Vec<u8>> {
    let max_len = link.max_frame_len().max(1);
    let mut out = Vec::with_capacity(len);
    let mut offset = 0usize;

    while offset < len {
        let chunk_len = core::cmp::min(max_len, len - offset);
        let chunk = link.read_frame(base + offset as u16, chunk_len)?;
        if chunk.len() != chunk_len {
            return Err(LinkError::ShortTransfer {
                expected: chunk_len,
                got: chunk.len(),
            });
        }
        out.extend_from_slice(&chunk);
        offset += chunk_len;
        if offset < len && !inter_chunk_delay.is_zero() {
            link.delay(inter_chunk_delay);
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Records every frame; backs reads from a fixed register file.
    struct MockBus {
        registers: RefCell<Vec<u8>>,
        writes: RefCell<Vec<(u16, usize)>>,
        reads: RefCell<Vec<(u16, usize)>>,
        max_frame_len: usize,
    }

    impl MockBus {
        fn new(size: usize, max_frame_len: usize) -> Self {
            Self {
                registers: RefCell::new(vec![0; size]),
                writes: RefCell::new(Vec::new()),
                reads: RefCell::new(Vec::new()),
                max_frame_len,
            }
        }
    }

    impl BusTransport for MockBus {
        fn write_frame(&mut self, start_register: u16, bytes: &[u8]) -> LinkResult<()> {
            self.writes
                .borrow_mut()
                .push((start_register, bytes.len()));
            let start = usize::from(start_register);
            self.registers.borrow_mut()[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }

        fn read_frame(&mut self, start_register: u16, count: usize) -> LinkResult<Vec<u8>> {
            self.reads.borrow_mut().push((start_register, count));
            let start = usize::from(start_register);
            Ok(self.registers.borrow()[start..start + count].to_vec())
        }

        fn max_frame_len(&self) -> usize {
            self.max_frame_len
        }

        fn delay(&mut self, _duration: Duration) {}
    }

    #[test]
    fn test_write_chunking_last_chunk_is_remainder() {
        let mut bus = MockBus::new(10, 4);
        let bytes: Vec<u8> = (0..10).collect();
        write_space(&mut bus, 0, &bytes, Duration::ZERO).unwrap();
        assert_eq!(*bus.writes.borrow(), vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(*bus.registers.borrow(), bytes);
    }

    #[test]
    fn test_read_chunking_matches_write_discipline() {
        let mut bus = MockBus::new(10, 4);
        bus.registers.borrow_mut().copy_from_slice(&[7u8; 10]);
        let readback = read_space(&mut bus, 0, 10, Duration::ZERO).unwrap();
        assert_eq!(*bus.reads.borrow(), vec![(0, 4), (4, 4), (8, 2)]);
        assert_eq!(readback, vec![7u8; 10]);
    }

    #[test]
    fn test_nonzero_base_offsets_frames() {
        let mut bus = MockBus::new(16, 8);
        write_space(&mut bus, 4, &[1, 2, 3], Duration::ZERO).unwrap();
        assert_eq!(*bus.writes.borrow(), vec![(4, 3)]);
        assert_eq!(bus.registers.borrow()[4..7], [1, 2, 3]);
    }
}
