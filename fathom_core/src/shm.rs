//! Memory shared between the supervisor and a forked attempt.
//!
//! Layout: a fixed header (verdict byte, reason length, consumed count and a
//! bounded reason string) followed by `capacity` bytes that mirror every
//! input byte the child reads. The parent only reads the region after it has
//! joined the child, so no locking is needed.

use crate::outcome::{Outcome, Verdict};
use std::io;
use std::ptr::NonNull;

/// Longest reason string carried back from a child.
pub const REASON_CAPACITY: usize = 1024;

const VERDICT_UNSET: u8 = 0xff;
const VERDICT_OFFSET: usize = 0;
const REASON_LEN_OFFSET: usize = 8;
const CONSUMED_OFFSET: usize = 16;
const REASON_OFFSET: usize = 24;
const DATA_OFFSET: usize = REASON_OFFSET + REASON_CAPACITY;

#[derive(Debug)]
pub struct SharedRegion {
    base: NonNull<u8>,
    len: usize,
    capacity: usize,
}

impl SharedRegion {
    /// Map a zeroed region large enough to mirror `capacity` input bytes.
    #[cfg(unix)]
    pub fn map(capacity: usize) -> io::Result<Self> {
        let len = DATA_OFFSET + capacity;
        // Safety: anonymous mapping with no fixed address; the result is checked.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(ptr.cast::<u8>())
            .ok_or_else(|| io::Error::other("mmap returned a null mapping"))?;
        let region = Self {
            base,
            len,
            capacity,
        };
        region.reset();
        Ok(region)
    }

    /// Without fork there is nobody to share with; plain heap memory will do.
    #[cfg(not(unix))]
    pub fn map(capacity: usize) -> io::Result<Self> {
        let len = DATA_OFFSET + capacity;
        let boxed = vec![0u8; len].into_boxed_slice();
        let ptr = Box::into_raw(boxed).cast::<u8>();
        let base = NonNull::new(ptr).ok_or_else(|| io::Error::other("allocation failed"))?;
        let region = Self {
            base,
            len,
            capacity,
        };
        region.reset();
        Ok(region)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear the outcome record and mirror count before the next attempt.
    pub fn reset(&self) {
        // Safety: all offsets lie inside the mapping.
        unsafe {
            self.base.as_ptr().add(VERDICT_OFFSET).write(VERDICT_UNSET);
            self.write_u32(REASON_LEN_OFFSET, 0);
            self.write_u64(CONSUMED_OFFSET, 0);
        }
    }

    pub fn write_outcome(&self, outcome: &Outcome) {
        let reason = outcome.reason.as_deref().unwrap_or("").as_bytes();
        let mut len = reason.len().min(REASON_CAPACITY);
        // Keep truncation on a character boundary.
        while len > 0 && len < reason.len() && (reason[len] & 0xc0) == 0x80 {
            len -= 1;
        }
        // Safety: `len` is bounded by REASON_CAPACITY.
        unsafe {
            std::ptr::copy_nonoverlapping(
                reason.as_ptr(),
                self.base.as_ptr().add(REASON_OFFSET),
                len,
            );
            self.write_u32(REASON_LEN_OFFSET, len as u32);
            self.base
                .as_ptr()
                .add(VERDICT_OFFSET)
                .write(outcome.verdict as u8);
        }
    }

    /// The outcome the child recorded, if it got that far.
    pub fn read_outcome(&self) -> Option<Outcome> {
        // Safety: all offsets lie inside the mapping.
        let (code, len) = unsafe {
            (
                self.base.as_ptr().add(VERDICT_OFFSET).read(),
                self.read_u32(REASON_LEN_OFFSET) as usize,
            )
        };
        let verdict = Verdict::from_code(i32::from(code))?;
        let len = len.min(REASON_CAPACITY);
        let reason = if len == 0 {
            None
        } else {
            // Safety: `len` is bounded by REASON_CAPACITY.
            let bytes = unsafe {
                std::slice::from_raw_parts(self.base.as_ptr().add(REASON_OFFSET), len)
            };
            Some(String::from_utf8_lossy(bytes).into_owned())
        };
        Some(Outcome { verdict, reason })
    }

    /// Bytes the child read before it finished or died.
    pub fn consumed_bytes(&self) -> Vec<u8> {
        // Safety: the count is clamped to the mirror capacity.
        unsafe {
            let count = (self.read_u64(CONSUMED_OFFSET) as usize).min(self.capacity);
            std::slice::from_raw_parts(self.base.as_ptr().add(DATA_OFFSET), count).to_vec()
        }
    }

    /// A handle the input stream uses to copy each byte it reads into the region.
    ///
    /// The handle must not outlive the region.
    pub(crate) fn mirror(&self) -> InputMirror {
        InputMirror {
            base: self.base,
            capacity: self.capacity,
        }
    }

    unsafe fn write_u32(&self, offset: usize, value: u32) {
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<u32>()
                .write_unaligned(value)
        }
    }

    unsafe fn read_u32(&self, offset: usize) -> u32 {
        unsafe { self.base.as_ptr().add(offset).cast::<u32>().read_unaligned() }
    }

    unsafe fn write_u64(&self, offset: usize, value: u64) {
        unsafe {
            self.base
                .as_ptr()
                .add(offset)
                .cast::<u64>()
                .write_unaligned(value)
        }
    }

    unsafe fn read_u64(&self, offset: usize) -> u64 {
        unsafe { self.base.as_ptr().add(offset).cast::<u64>().read_unaligned() }
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        release(self.base, self.len);
    }
}

#[cfg(unix)]
fn release(base: NonNull<u8>, len: usize) {
    // Safety: base/len describe the mapping created in `map`.
    unsafe {
        libc::munmap(base.as_ptr().cast(), len);
    }
}

#[cfg(not(unix))]
fn release(base: NonNull<u8>, len: usize) {
    // Safety: base/len describe the boxed slice leaked in `map`.
    unsafe {
        drop(Box::from_raw(std::ptr::slice_from_raw_parts_mut(
            base.as_ptr(),
            len,
        )));
    }
}

/// Write-side view of a [`SharedRegion`] held by an [`crate::InputStream`].
#[derive(Debug, Clone, Copy)]
pub struct InputMirror {
    base: NonNull<u8>,
    capacity: usize,
}

impl InputMirror {
    pub(crate) fn record(&self, index: usize, byte: u8) {
        if index >= self.capacity {
            return;
        }
        // Safety: index is below the mirror capacity and the region outlives the handle.
        unsafe {
            self.base.as_ptr().add(DATA_OFFSET + index).write(byte);
            self.base
                .as_ptr()
                .add(CONSUMED_OFFSET)
                .cast::<u64>()
                .write_unaligned((index + 1) as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::InputStream;

    #[test]
    fn fresh_region_has_no_outcome() {
        let region = SharedRegion::map(16).unwrap();
        assert_eq!(region.read_outcome(), None);
        assert!(region.consumed_bytes().is_empty());
    }

    #[test]
    fn outcome_survives_write_and_read() {
        let region = SharedRegion::map(16).unwrap();
        region.write_outcome(&Outcome::failed(Some("x == 31337".to_string())));
        let outcome = region.read_outcome().unwrap();
        assert_eq!(outcome.verdict, Verdict::Failed);
        assert_eq!(outcome.reason.as_deref(), Some("x == 31337"));

        region.reset();
        assert_eq!(region.read_outcome(), None);
    }

    #[test]
    fn long_reasons_are_truncated() {
        let region = SharedRegion::map(4).unwrap();
        let reason = "é".repeat(REASON_CAPACITY);
        region.write_outcome(&Outcome::abandoned(reason));
        let stored = region.read_outcome().unwrap().reason.unwrap();
        assert!(stored.len() <= REASON_CAPACITY);
        assert!(stored.chars().all(|c| c == 'é'), "Truncation split a character");
    }

    #[test]
    fn mirror_tracks_bytes_read_from_input() {
        let region = SharedRegion::map(8).unwrap();
        let mut input = InputStream::new(8);
        input.load(&[1, 2, 3]);
        input.attach_mirror(region.mirror());
        input.read_byte().unwrap();
        input.read_byte().unwrap();
        input.detach_mirror();
        input.read_byte().unwrap();
        assert_eq!(region.consumed_bytes(), vec![1, 2]);
    }
}
