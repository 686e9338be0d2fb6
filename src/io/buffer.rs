// Aligned heap buffer for cache-bypassing writes.

use super::{IOError, IOResult};
use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

/// Alignment requirements for Direct I/O
pub const SECTOR_SIZE: usize = 512;
pub const PAGE_SIZE: usize = 4096;

/// Heap buffer whose address and size satisfy O_DIRECT alignment. One buffer
/// is reused for every block of a pass, so allocation cost is paid once.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    layout: Layout,
    size: usize,
}

// The buffer owns its allocation exclusively
unsafe impl Send for AlignedBuffer {}

impl AlignedBuffer {
    pub fn new(size: usize, alignment: usize) -> IOResult<Self> {
        if !alignment.is_power_of_two() {
            return Err(IOError::AlignmentError(format!(
                "alignment {} is not a power of 2",
                alignment
            )));
        }
        if size == 0 {
            return Err(IOError::AllocationFailed("zero-sized buffer".to_string()));
        }

        // Round size up to the alignment so full-block writes stay aligned
        let aligned_size = (size + alignment - 1) & !(alignment - 1);

        let layout = Layout::from_size_align(aligned_size, alignment)
            .map_err(|e| IOError::AllocationFailed(e.to_string()))?;

        let ptr = unsafe {
            let raw = alloc_zeroed(layout);
            if raw.is_null() {
                return Err(IOError::AllocationFailed(format!(
                    "failed to allocate {} bytes",
                    aligned_size
                )));
            }
            NonNull::new_unchecked(raw)
        };

        Ok(Self {
            ptr,
            layout,
            size: aligned_size,
        })
    }

    /// Buffer aligned for page-granular direct writes.
    pub fn page_aligned(size: usize) -> IOResult<Self> {
        Self::new(size, PAGE_SIZE)
    }

    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe {
            dealloc(self.ptr.as_ptr(), self.layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_is_aligned_and_rounded() {
        let buffer = AlignedBuffer::page_aligned(5000).unwrap();
        assert_eq!(buffer.as_slice().as_ptr() as usize % PAGE_SIZE, 0);
        assert_eq!(buffer.len(), 8192);
    }

    #[test]
    fn buffer_starts_zeroed_and_is_writable() {
        let mut buffer = AlignedBuffer::new(SECTOR_SIZE, SECTOR_SIZE).unwrap();
        assert!(buffer.as_slice().iter().all(|&b| b == 0));

        buffer.as_mut_slice().fill(0xFF);
        assert!(buffer.as_slice().iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn rejects_bad_alignment() {
        assert!(AlignedBuffer::new(4096, 1000).is_err());
        assert!(AlignedBuffer::new(0, 4096).is_err());
    }
}
