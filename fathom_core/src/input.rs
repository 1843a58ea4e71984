use crate::outcome::AbandonReason;
use crate::shm::InputMirror;
use rand_chacha::ChaCha8Rng;
use rand_core::RngCore;

/// Default input capacity in bytes.
pub const DEFAULT_INPUT_SIZE: usize = 32768;

/// How bytes past the initialized length are produced.
#[derive(Debug, Clone, Default)]
pub enum Fill {
    /// Replay: reading past the real input yields zero bytes.
    #[default]
    Zero,
    /// Brute-force fuzzing: synthesize bytes on demand and write them back
    /// into the buffer so the consumed prefix replays identically.
    Random(ChaCha8Rng),
}

/// Fixed-capacity byte buffer with a monotonically advancing cursor.
///
/// `initialized` marks how many leading bytes came from a real external
/// input. The cursor never exceeds the capacity; a read at capacity fails
/// with [`AbandonReason::InputExhausted`].
#[derive(Debug)]
pub struct InputStream {
    buf: Box<[u8]>,
    cursor: usize,
    initialized: usize,
    fill: Fill,
    symbolic: bool,
    verbose_reads: bool,
    mirror: Option<InputMirror>,
}

impl InputStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            initialized: 0,
            fill: Fill::Zero,
            symbolic: false,
            verbose_reads: false,
            mirror: None,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn initialized(&self) -> usize {
        self.initialized
    }

    pub fn remaining(&self) -> usize {
        self.capacity() - self.cursor
    }

    /// The bytes consumed so far by the current attempt.
    pub fn consumed(&self) -> &[u8] {
        &self.buf[..self.cursor]
    }

    /// Address range of the backing buffer, for instrumentation layers.
    pub fn bounds(&self) -> (*const u8, *const u8) {
        let range = self.buf.as_ptr_range();
        (range.start, range.end)
    }

    pub fn set_fill(&mut self, fill: Fill) {
        self.fill = fill;
    }

    pub fn fill(&self) -> &Fill {
        &self.fill
    }

    pub fn set_symbolic(&mut self, symbolic: bool) {
        self.symbolic = symbolic;
    }

    pub fn set_verbose_reads(&mut self, verbose: bool) {
        self.verbose_reads = verbose;
    }

    pub(crate) fn attach_mirror(&mut self, mirror: InputMirror) {
        self.mirror = Some(mirror);
    }

    pub(crate) fn detach_mirror(&mut self) {
        self.mirror = None;
    }

    /// Move the cursor back to the start, keeping loaded bytes.
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Rewind for a new attempt with no external input. Bytes past the
    /// cursor are produced by the fill policy.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.initialized = 0;
    }

    /// Rewind and load `data` as the real input, truncated to capacity.
    /// Returns the number of bytes loaded.
    pub fn load(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.capacity());
        self.buf[..count].copy_from_slice(&data[..count]);
        self.cursor = 0;
        self.initialized = count;
        count
    }

    /// Check that `count` more bytes can be read before reading any of them.
    pub fn ensure_available(&self, count: usize) -> Result<(), AbandonReason> {
        if self.cursor + count > self.capacity() {
            return Err(AbandonReason::InputExhausted {
                capacity: self.capacity(),
            });
        }
        Ok(())
    }

    pub fn read_byte(&mut self) -> Result<u8, AbandonReason> {
        let index = self.cursor;
        if index >= self.capacity() {
            return Err(AbandonReason::InputExhausted {
                capacity: self.capacity(),
            });
        }
        if self.verbose_reads {
            tracing::trace!(target: "fathom::reads", index, "Reading byte");
        }

        // Under symbolic execution the engine owns the buffer contents.
        if !self.symbolic && index >= self.initialized {
            self.buf[index] = match &mut self.fill {
                Fill::Zero => 0,
                Fill::Random(rng) => (rng.next_u32() & 0xff) as u8,
            };
        }

        let byte = self.buf[index];
        self.cursor += 1;
        if let Some(mirror) = &self.mirror {
            mirror.record(index, byte);
        }
        Ok(byte)
    }
}

impl Default for InputStream {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE)
    }
}
