//! Typed values built from the input stream.
//!
//! Integers are assembled big-endian one byte at a time. Floats are copied
//! bit-for-bit, so NaNs and denormals come through unchanged.

use crate::attempt::Attempt;
use crate::outcome::{AbandonReason, Escape, Flow};
use crate::swarm::SwarmKind;
use std::ffi::CString;
use std::panic::Location;

/// Marks a probability left for the others to determine.
const UNSPECIFIED_PROB: f64 = -1.0;

/// Resolution of the uniform draw behind weighted picks.
const WEIGHT_RESOLUTION: u32 = 10_000_000;

macro_rules! int_generators {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Flow<$ty> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                self.read_multi(&mut bytes)?;
                Ok(<$ty>::from_be_bytes(bytes))
            }
        )*
    };
}

impl Attempt {
    int_generators!(
        u8: u8, u16: u16, u32: u32, u64: u64, usize: usize,
        i8: i8, i16: i16, i32: i32, i64: i64, isize: isize,
    );

    /// Fill `out` in read order, checking the whole width is available first.
    fn read_multi(&mut self, out: &mut [u8]) -> Flow {
        self.input.ensure_available(out.len())?;
        if self.verbose_reads {
            tracing::trace!(target: "fathom::reads", "Starting multi-byte read");
        }
        for byte in out.iter_mut() {
            *byte = self.input.read_byte()?;
        }
        if self.verbose_reads {
            tracing::trace!(target: "fathom::reads", "Finished multi-byte read");
        }
        Ok(())
    }

    pub fn bool(&mut self) -> Flow<bool> {
        Ok(self.input.read_byte()? & 1 == 1)
    }

    pub fn f32(&mut self) -> Flow<f32> {
        let mut bytes = [0u8; 4];
        self.symbolize(&mut bytes)?;
        Ok(f32::from_ne_bytes(bytes))
    }

    pub fn f64(&mut self) -> Flow<f64> {
        let mut bytes = [0u8; 8];
        self.symbolize(&mut bytes)?;
        Ok(f64::from_ne_bytes(bytes))
    }

    /// Overwrite `region` with input bytes.
    pub fn symbolize(&mut self, region: &mut [u8]) -> Flow {
        for byte in region.iter_mut() {
            *byte = self.input.read_byte()?;
        }
        Ok(())
    }

    /// Overwrite `region` with input bytes, turning zeros into ones so the
    /// result can be NUL-terminated at exactly its length.
    pub fn symbolize_no_null(&mut self, region: &mut [u8]) -> Flow {
        for byte in region.iter_mut() {
            *byte = match self.input.read_byte()? {
                0 => 1,
                b => b,
            };
        }
        Ok(())
    }

    /// Symbolize `buf[begin..end]`. An inverted or out-of-bounds region abandons.
    pub fn symbolize_range(&mut self, buf: &mut [u8], begin: usize, end: usize) -> Flow {
        if begin > end || end > buf.len() {
            return Err(AbandonReason::InvalidRegion {
                begin,
                end,
                len: buf.len(),
            }
            .into());
        }
        self.symbolize(&mut buf[begin..end])
    }

    /// `len` fresh input bytes.
    pub fn bytes(&mut self, len: usize) -> Flow<Vec<u8>> {
        let mut out = vec![0u8; len];
        self.symbolize(&mut out)?;
        Ok(out)
    }

    /// Identity hook for a symbolic backend to pin down abstract bytes.
    #[inline(never)]
    pub fn concretize<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        std::hint::black_box(data)
    }

    /// A string of exactly `len` non-NUL bytes, drawn from `allowed` if given.
    pub fn cstring(&mut self, len: usize, allowed: Option<&[u8]>) -> Flow<CString> {
        let mut bytes = vec![0u8; len];
        match allowed {
            None => self.symbolize_no_null(&mut bytes)?,
            Some(allowed) => {
                check_alphabet(allowed)?;
                for byte in bytes.iter_mut() {
                    *byte = allowed[self.in_range(0, allowed.len() - 1)?];
                }
            }
        }
        into_cstring(bytes)
    }

    /// Like [`Attempt::cstring`], but characters come from a swarm subset of
    /// the alphabet (every non-NUL byte when `allowed` is `None`).
    #[track_caller]
    pub fn swarm_cstring(
        &mut self,
        kind: SwarmKind,
        len: usize,
        allowed: Option<&[u8]>,
    ) -> Flow<CString> {
        let location = Location::caller();
        let mut bytes = vec![0u8; len];
        self.fill_from_swarm(kind, &mut bytes, allowed, location)?;
        into_cstring(bytes)
    }

    /// Overwrite a NUL-terminated buffer up to its terminator, keeping the
    /// terminator where it was. A buffer without one is overwritten entirely.
    pub fn symbolize_cstr(&mut self, buf: &mut [u8], allowed: Option<&[u8]>) -> Flow {
        let len = c_len(buf);
        match allowed {
            None => self.symbolize_no_null(&mut buf[..len]),
            Some(allowed) => {
                if len == 0 {
                    return Ok(());
                }
                check_alphabet(allowed)?;
                for byte in buf[..len].iter_mut() {
                    *byte = allowed[self.in_range(0, allowed.len() - 1)?];
                }
                Ok(())
            }
        }
    }

    #[track_caller]
    pub fn swarm_symbolize_cstr(
        &mut self,
        kind: SwarmKind,
        buf: &mut [u8],
        allowed: Option<&[u8]>,
    ) -> Flow {
        let location = Location::caller();
        let len = c_len(buf);
        self.fill_from_swarm(kind, &mut buf[..len], allowed, location)
    }

    fn fill_from_swarm(
        &mut self,
        kind: SwarmKind,
        out: &mut [u8],
        allowed: Option<&[u8]>,
        location: &'static Location<'static>,
    ) -> Flow {
        if out.is_empty() {
            return Ok(());
        }
        let every_byte: Vec<u8> = (1..=255).collect();
        let allowed = allowed.unwrap_or(every_byte.as_slice());
        check_alphabet(allowed)?;
        let config = self.swarm_config(kind, allowed.len(), location.file(), location.line())?;
        for byte in out.iter_mut() {
            let index = self.in_range(0, config.selection().len() - 1)?;
            *byte = allowed[config.selection()[index]];
        }
        Ok(())
    }

    /// Run `f` or skip it, decided by one input byte.
    pub fn maybe(&mut self, f: impl FnOnce(&mut Self) -> Flow) -> Flow {
        if self.bool()? { f(self) } else { Ok(()) }
    }

    /// Pick an index in `0..count`.
    ///
    /// When a default swarm kind is configured the pick goes through the
    /// swarm registry, keyed by the caller's location.
    #[track_caller]
    pub fn choose(&mut self, count: usize) -> Flow<usize> {
        if count == 0 {
            return Err(Escape::usage("Empty choice passed to choose"));
        }
        if let Some(kind) = self.default_swarm {
            return self.swarm_choose(kind, count);
        }
        if self.verbose_reads {
            tracing::trace!(target: "fathom::reads", count, "Starting one-of");
        }
        let max = pump_limit(count)?;
        let index = self.in_range(0, count - 1)?;
        let index = self.pump(index, max)?;
        if self.verbose_reads {
            tracing::trace!(target: "fathom::reads", index, "Finished one-of");
        }
        Ok(index)
    }

    /// Pick one element of `items`.
    #[track_caller]
    pub fn one_of<'a, T>(&mut self, items: &'a [T]) -> Flow<&'a T> {
        if items.is_empty() {
            return Err(Escape::usage("Empty slice passed to one_of"));
        }
        let index = self.choose(items.len())?;
        Ok(&items[index])
    }

    /// Pick an index in `0..count` through the swarm config for the caller's site.
    #[track_caller]
    pub fn swarm_choose(&mut self, kind: SwarmKind, count: usize) -> Flow<usize> {
        let location = Location::caller();
        if count == 0 {
            return Err(Escape::usage("Empty choice passed to swarm_choose"));
        }
        let config = self.swarm_config(kind, count, location.file(), location.line())?;
        self.swarm_pick(&config)
    }

    #[track_caller]
    pub fn swarm_one_of<'a, T>(&mut self, kind: SwarmKind, items: &'a [T]) -> Flow<&'a T> {
        if items.is_empty() {
            return Err(Escape::usage("Empty slice passed to swarm_one_of"));
        }
        let index = self.swarm_choose(kind, items.len())?;
        Ok(&items[index])
    }

    /// Pick an index with the given probabilities.
    ///
    /// Negative entries are unspecified and share whatever probability the
    /// others leave over.
    pub fn pick_weighted(&mut self, probs: &[f64]) -> Flow<usize> {
        if probs.is_empty() {
            return Err(Escape::usage("Empty probability list passed to pick_weighted"));
        }
        let total: f64 = probs.iter().filter(|p| **p >= 0.0).sum();
        let missing = probs.iter().filter(|p| **p < 0.0).count();
        if total > 1.0 {
            return Err(Escape::usage("Probabilities sum to more than 1.0"));
        }
        if missing == 0 && total < 0.999 {
            return Err(Escape::usage(
                "Total of probabilities is significantly less than 1.0",
            ));
        }
        let remainder = if missing > 0 {
            (1.0 - total) / missing as f64
        } else {
            0.0
        };

        let p = f64::from(self.in_range(0, WEIGHT_RESOLUTION)?) / f64::from(WEIGHT_RESOLUTION);
        let mut sum = 0.0;
        for (index, prob) in probs.iter().enumerate() {
            let prob = if *prob < 0.0 { remainder } else { *prob };
            if p <= sum + prob {
                return Ok(index);
            }
            sum += prob;
        }
        Ok(probs.len() - 1)
    }

    /// Pick one element of `items` with the matching probability from `probs`.
    ///
    /// Items past the end of a shorter `probs` are unspecified and split the
    /// leftover probability evenly.
    pub fn one_of_weighted<'a, T>(&mut self, probs: &[f64], items: &'a [T]) -> Flow<&'a T> {
        if probs.len() > items.len() {
            return Err(Escape::usage(format!(
                "one_of_weighted given {} probabilities for {} items",
                probs.len(),
                items.len()
            )));
        }
        let mut padded = probs.to_vec();
        padded.resize(items.len(), UNSPECIFIED_PROB);
        let index = self.pick_weighted(&padded)?;
        Ok(&items[index])
    }
}

/// Option count as a pump bound; counts past `u32::MAX` cannot be pumped.
pub(crate) fn pump_limit(count: usize) -> Flow<u32> {
    u32::try_from(count)
        .map_err(|_| Escape::usage(format!("Cannot choose among {count} options")))
}

fn check_alphabet(allowed: &[u8]) -> Flow {
    if allowed.is_empty() {
        return Err(Escape::usage("Empty alphabet passed to a string generator"));
    }
    if allowed.contains(&0) {
        return Err(Escape::usage("String alphabet may not contain NUL"));
    }
    Ok(())
}

fn c_len(buf: &[u8]) -> usize {
    buf.iter().position(|b| *b == 0).unwrap_or(buf.len())
}

fn into_cstring(bytes: Vec<u8>) -> Flow<CString> {
    CString::new(bytes).map_err(|e| Escape::usage(format!("Generated string holds a NUL: {e}")))
}
