//! Range-constrained sampling, satisfying search and extremization.
//!
//! Out-of-range draws are folded back into `[low, high]` by a fixed mapping
//! that saved cases depend on for replay. The default policy wraps by the
//! offset from `low`; the `range-boundary-bias` feature pins to the nearer
//! bound instead.

use crate::assume;
use crate::attempt::Attempt;
use crate::outcome::{AbandonReason, Escape, Flow};
use std::fmt;

/// Identity hook a symbolic backend replaces with the smallest feasible value.
#[inline(never)]
pub fn min_uint(value: u32) -> u32 {
    std::hint::black_box(value)
}

#[inline(never)]
pub fn max_uint(value: u32) -> u32 {
    std::hint::black_box(value)
}

#[inline(never)]
pub fn min_int(value: i32) -> i32 {
    std::hint::black_box(value)
}

#[inline(never)]
pub fn max_int(value: i32) -> i32 {
    std::hint::black_box(value)
}

#[inline(never)]
pub fn min_uint64(value: u64) -> u64 {
    std::hint::black_box(value)
}

#[inline(never)]
pub fn max_uint64(value: u64) -> u64 {
    std::hint::black_box(value)
}

#[inline(never)]
pub fn min_int64(value: i64) -> i64 {
    std::hint::black_box(value)
}

#[inline(never)]
pub fn max_int64(value: i64) -> i64 {
    std::hint::black_box(value)
}

/// Whether a value is still abstract. Concrete execution never has such values.
#[inline(never)]
pub fn is_symbolic_uint(value: u32) -> bool {
    let _ = std::hint::black_box(value);
    false
}

pub fn is_symbolic_uint64(value: u64) -> bool {
    is_symbolic_uint(value as u32) || is_symbolic_uint((value >> 32) as u32)
}

/// Integer types that can be minimized, maximized and queried for symbolic-ness.
pub trait Extremize: Copy + PartialEq {
    fn minimize(self) -> Self;
    fn maximize(self) -> Self;
    fn is_symbolic(self) -> bool;
}

macro_rules! extremize_via {
    ($via:ty, $min:ident, $max:ident, $sym:expr; $($ty:ty),*) => {
        $(
            impl Extremize for $ty {
                fn minimize(self) -> Self {
                    $min(self as $via) as $ty
                }

                fn maximize(self) -> Self {
                    $max(self as $via) as $ty
                }

                fn is_symbolic(self) -> bool {
                    let sym: fn($ty) -> bool = $sym;
                    sym(self)
                }
            }
        )*
    };
}

extremize_via!(u32, min_uint, max_uint, |v| is_symbolic_uint(v as u32); u8, u16, u32);
extremize_via!(i32, min_int, max_int, |v| is_symbolic_uint(v as u32); i8, i16, i32);
extremize_via!(u64, min_uint64, max_uint64, |v| is_symbolic_uint64(v as u64); u64, usize);
extremize_via!(i64, min_int64, max_int64, |v| is_symbolic_uint64(v as u64); i64, isize);

/// Integer types [`Attempt::in_range`] can sample.
///
/// Every implementor fits in an `i128`, which keeps the range arithmetic
/// free of overflow.
pub trait RangeInt: Extremize + Ord + fmt::Display {
    fn draw(attempt: &mut Attempt) -> Flow<Self>;
    fn to_wide(self) -> i128;
    /// Truncating conversion; wraps values outside the type's range.
    fn from_wide(wide: i128) -> Self;
}

macro_rules! range_int {
    ($($ty:ty => $draw:ident),*) => {
        $(
            impl RangeInt for $ty {
                fn draw(attempt: &mut Attempt) -> Flow<Self> {
                    attempt.$draw()
                }

                fn to_wide(self) -> i128 {
                    self as i128
                }

                fn from_wide(wide: i128) -> Self {
                    wide as $ty
                }
            }
        )*
    };
}

range_int!(
    u8 => u8, u16 => u16, u32 => u32, u64 => u64, usize => usize,
    i8 => i8, i16 => i16, i32 => i32, i64 => i64, isize => isize
);

/// Map a raw draw into `[low, high]`. Requires `low <= high`.
///
/// Out-of-range draws wrap on their distance from `low`, so a draw one below
/// `low` lands on `high` and one above `high` lands on `low`. This is not
/// `low + (unsigned)x % span`, which agrees only when `low` is zero; the same
/// input bytes can therefore map to different values than that formula gives.
#[cfg(not(feature = "range-boundary-bias"))]
pub fn fit_into_range<T: RangeInt>(x: T, low: T, high: T) -> T {
    if low <= x && x <= high {
        return x;
    }
    let size = high.to_wide() - low.to_wide() + 1;
    let offset = (x.to_wide() - low.to_wide()).rem_euclid(size);
    T::from_wide(low.to_wide() + offset)
}

/// Map a raw draw into `[low, high]`. Requires `low <= high`.
#[cfg(feature = "range-boundary-bias")]
pub fn fit_into_range<T: RangeInt>(x: T, low: T, high: T) -> T {
    if x < low {
        low
    } else if x > high {
        high
    } else {
        x
    }
}

macro_rules! float_in_range {
    ($name:ident, $float:ty, $bits:ty, $ubits:ty) => {
        /// Draw a value in `[low, high]`, abandoning on bit patterns that
        /// decode outside the range.
        pub fn $name(&mut self, low: $float, high: $float) -> Flow<$float> {
            if low.is_nan() || high.is_nan() {
                return Err(Escape::usage(concat!(
                    "NaN bound passed to ",
                    stringify!($name)
                )));
            }
            if low == high {
                return Ok(low);
            }
            if low > high {
                return self.$name(high, low);
            }
            if low < 0.0 {
                if high > 0.0 {
                    // Pick a side first so sign flips do not skew the draw.
                    return if self.bool()? {
                        Ok(-self.$name(0.0, -low)?)
                    } else {
                        self.$name(0.0, high)
                    };
                }
                return Ok(-self.$name(-high, -low)?);
            }
            // -0.0 has the sign bit set; fold both bounds into +0.0.
            let low = low + 0.0;
            let high = high + 0.0;
            let raw = self.in_range(low.to_bits() as $bits, high.to_bits() as $bits)?;
            let value = <$float>::from_bits(raw as $ubits);
            assume!(self, value >= low && value <= high);
            Ok(value)
        }
    };
}

impl Attempt {
    /// Draw an integer in `[low, high]`; the bounds may come in either order.
    pub fn in_range<T: RangeInt>(&mut self, low: T, high: T) -> Flow<T> {
        if low == high {
            return Ok(low);
        }
        let (low, high) = if low > high { (high, low) } else { (low, high) };
        let x = T::draw(self)?;
        if self.is_symbolic() {
            assume!(self, low <= x && x <= high);
            return Ok(x);
        }
        if self.verbose_reads {
            tracing::trace!(target: "fathom::reads", %low, %high, "Range read");
        }
        let fitted = fit_into_range(x, low, high);
        if self.verbose_reads && fitted != x {
            tracing::trace!(target: "fathom::reads", "Converting out-of-range value to {fitted}");
        }
        Ok(fitted)
    }

    float_in_range!(f32_in_range, f32, i32, u32);
    float_in_range!(f64_in_range, f64, i64, u64);

    /// Concretize `value` through the minimizer. Only changes anything under a
    /// symbolic backend.
    pub fn pump<T: Extremize>(&mut self, value: T, max: u32) -> Flow<T> {
        if max == 0 {
            return Err(Escape::usage(
                "Must have a positive maximum number of values to pump",
            ));
        }
        if !value.is_symbolic() {
            return Ok(value);
        }
        for _ in 1..max {
            let min = value.minimize();
            if min == value {
                return Ok(min);
            }
        }
        Ok(value.minimize())
    }

    pub fn minimize<T: Extremize>(&self, value: T) -> T {
        value.minimize()
    }

    pub fn maximize<T: Extremize>(&self, value: T) -> T {
        value.maximize()
    }

    /// Search outward from `initial` for a value satisfying `pred`.
    ///
    /// Alternates incrementing and decrementing (wrapping at the type's
    /// bounds) until `pred` holds or the search budget runs out.
    pub fn satisfying<T: RangeInt>(&mut self, initial: T, pred: impl Fn(T) -> bool) -> Flow<T> {
        if self.is_symbolic() {
            assume!(self, pred(initial));
            return Ok(initial);
        }
        let budget = self.search_budget;
        let mut value = initial;
        let mut up = initial.to_wide();
        let mut down = up;
        let mut iterations: u64 = 0;
        while !pred(value) {
            if iterations > budget {
                return Err(AbandonReason::SearchExhausted { iterations }.into());
            }
            iterations += 1;
            up += 1;
            value = T::from_wide(up);
            if !pred(value) {
                down -= 1;
                value = T::from_wide(down);
            }
        }
        Ok(value)
    }

    /// Like [`Attempt::satisfying`], but candidates never leave `[low, high]`.
    pub fn satisfying_in_range<T: RangeInt>(
        &mut self,
        initial: T,
        low: T,
        high: T,
        pred: impl Fn(T) -> bool,
    ) -> Flow<T> {
        assume!(self, low <= initial && initial <= high);
        if self.is_symbolic() {
            assume!(self, pred(initial));
            return Ok(initial);
        }
        let budget = self.search_budget;
        let mut value = initial;
        let mut up = initial;
        let mut down = initial;
        let mut iterations: u64 = 0;
        while !pred(value) {
            if iterations > budget {
                return Err(AbandonReason::SearchExhausted { iterations }.into());
            }
            iterations += 1;
            if up < high {
                up = T::from_wide(up.to_wide() + 1);
                value = up;
            } else if down == low {
                return Err(AbandonReason::SearchExhausted { iterations }.into());
            }
            if !pred(value) && down > low {
                down = T::from_wide(down.to_wide() - 1);
                value = down;
            }
        }
        Ok(value)
    }
}
