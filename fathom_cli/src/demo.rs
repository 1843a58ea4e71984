//! Demonstration tests registered by the harness binary.

use fathom_core::{Attempt, Flow, SwarmKind, TestRegistry, check, ensure, test_case};

pub fn registry() -> TestRegistry {
    [
        test_case!(lucky_number),
        test_case!(run_length_round_trip),
        test_case!(range_apis),
        test_case!(stack_model),
        test_case!(crash_on_magic),
        test_case!(BoringArithmetic),
        test_case!(Overflow_DISABLED),
    ]
    .into_iter()
    .collect()
}

/// Fails for exactly one 4-byte input: 31337, big-endian.
pub fn lucky_number(attempt: &mut Attempt) -> Flow {
    let x = attempt.u32()?;
    if x == 31337 {
        return attempt.fail("Found the lucky number 31337");
    }
    Ok(())
}

/// Run-length encoding where each run is stored as the byte followed by a
/// digit. Runs longer than nine get clipped, so long runs do not survive.
fn encode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < input.len() {
        let byte = input[i];
        let mut run = 1;
        while i + run < input.len() && input[i + run] == byte {
            run += 1;
        }
        out.push(byte);
        out.push(b'0' + run.min(9) as u8);
        i += run;
    }
    out
}

fn decode(encoded: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    for pair in encoded.chunks_exact(2) {
        let run = usize::from(pair[1] - b'0');
        out.extend(std::iter::repeat_n(pair[0], run));
    }
    out
}

pub fn run_length_round_trip(attempt: &mut Attempt) -> Flow {
    let len = attempt.in_range(1usize, 32)?;
    let text = attempt.swarm_cstring(SwarmKind::Mixed, len, Some(&b"ab"[..]))?;
    let original = text.as_bytes();
    let round_trip = decode(&encode(original));
    ensure!(
        attempt,
        round_trip == original,
        "{:?} decoded as {:?}",
        String::from_utf8_lossy(original),
        String::from_utf8_lossy(&round_trip)
    );
    Ok(())
}

pub fn range_apis(attempt: &mut Attempt) -> Flow {
    let low = attempt.i32()?;
    let high = attempt.i32()?;
    let v = attempt.in_range(low, high)?;
    ensure!(attempt, low.min(high) <= v && v <= low.max(high));

    let modulus = attempt.in_range(2i32, 45)?;
    let start = attempt.i32()?;
    let multiple = attempt.satisfying(start, move |v| v % modulus == 0)?;
    ensure!(attempt, multiple % modulus == 0, "modulus {modulus}, v {multiple}");

    let dlow = attempt.f64()?;
    fathom_core::assume!(attempt, !dlow.is_nan());
    let dhigh = attempt.f64()?;
    fathom_core::assume!(attempt, !dhigh.is_nan());
    let dv = attempt.f64_in_range(dlow, dhigh)?;
    ensure!(
        attempt,
        dlow.min(dhigh) <= dv && dv <= dlow.max(dhigh),
        "dlow {dlow}, dhigh {dhigh}, dv {dv}"
    );
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum StackOp {
    Push,
    Pop,
    Peek,
    Clear,
}

/// Bounded stack checked against a `Vec` model.
struct BoundedStack {
    slots: [u8; 8],
    len: usize,
}

impl BoundedStack {
    fn push(&mut self, value: u8) -> bool {
        if self.len == self.slots.len() {
            return false;
        }
        self.slots[self.len] = value;
        self.len += 1;
        true
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        self.len -= 1;
        Some(self.slots[self.len])
    }

    fn peek(&self) -> Option<u8> {
        self.len.checked_sub(1).map(|top| self.slots[top])
    }
}

pub fn stack_model(attempt: &mut Attempt) -> Flow {
    let mut stack = BoundedStack {
        slots: [0; 8],
        len: 0,
    };
    let mut model: Vec<u8> = Vec::new();
    let steps = attempt.in_range(1u8, 24)?;
    for _ in 0..steps {
        let op = *attempt.swarm_one_of(
            SwarmKind::Prob,
            &[StackOp::Push, StackOp::Pop, StackOp::Peek, StackOp::Clear],
        )?;
        match op {
            StackOp::Push => {
                let value = attempt.u8()?;
                let accepted = model.len() < 8;
                if accepted {
                    model.push(value);
                }
                check!(attempt, stack.push(value) == accepted);
            }
            StackOp::Pop => {
                let popped = stack.pop();
                check!(attempt, popped == model.pop());
            }
            StackOp::Peek => check!(attempt, stack.peek() == model.last().copied()),
            StackOp::Clear => {
                attempt.maybe(|_| {
                    stack.len = 0;
                    model.clear();
                    Ok(())
                })?;
            }
        }
    }
    ensure!(attempt, stack.len == model.len());
    Ok(())
}

/// Dies by signal on one magic word, which only process isolation survives.
pub fn crash_on_magic(attempt: &mut Attempt) -> Flow {
    let word = attempt.u32()?;
    if word == 0xDEAD_BEEF {
        std::process::abort();
    }
    Ok(())
}

#[allow(non_snake_case)]
pub fn BoringArithmetic(attempt: &mut Attempt) -> Flow {
    let a = u32::from(attempt.u16()?);
    let b = u32::from(attempt.u16()?);
    ensure!(attempt, a + b >= a);
    Ok(())
}

#[allow(non_snake_case)]
pub fn Overflow_DISABLED(attempt: &mut Attempt) -> Flow {
    let a = attempt.u8()?;
    let b = *attempt.one_of_weighted(&[0.25, -1.0], &[0u8, 200])?;
    let sum = a.wrapping_add(b);
    ensure!(attempt, sum >= a, "{a} + {b} wrapped to {sum}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fathom_core::executor::run_boundary;
    use fathom_core::{TestFn, Verdict};

    fn verdict_over(test: TestFn, bytes: &[u8]) -> Verdict {
        let mut attempt = Attempt::default();
        attempt.begin_with(bytes);
        run_boundary(test, &mut attempt).verdict
    }

    #[test]
    fn lucky_number_fails_only_on_31337() {
        assert_eq!(verdict_over(lucky_number, &[0, 0, 0x7a, 0x69]), Verdict::Failed);
        assert_eq!(verdict_over(lucky_number, &[0, 0, 0x7a, 0x6a]), Verdict::Passed);
        assert_eq!(verdict_over(lucky_number, &[]), Verdict::Passed);
    }

    #[test]
    fn run_length_codec_round_trips_short_runs() {
        let text = b"aabbbab";
        assert_eq!(encode(text), b"a2b3a1b1");
        assert_eq!(decode(&encode(text)), text);
        let long = [b'a'; 12];
        assert_ne!(decode(&encode(&long)), long);
    }

    #[test]
    fn zero_input_passes_every_enabled_demo() {
        let registry = registry();
        for test in registry.iter().filter(|t| !t.is_disabled()) {
            assert_eq!(verdict_over(test.entry, &[]), Verdict::Passed, "{}", test.name);
        }
    }

    #[test]
    fn stack_matches_model() {
        let mut stack = BoundedStack {
            slots: [0; 8],
            len: 0,
        };
        for v in 0..8 {
            assert!(stack.push(v));
        }
        assert!(!stack.push(9));
        assert_eq!(stack.peek(), Some(7));
        assert_eq!(stack.pop(), Some(7));
    }

    #[test]
    fn disabled_overflow_demo_can_fail() {
        // a = 100, then a pick landing on 200 wraps the sum.
        let mut bytes = vec![100];
        bytes.extend_from_slice(&9_000_000u32.to_be_bytes());
        assert_eq!(verdict_over(Overflow_DISABLED, &bytes), Verdict::Failed);
    }

    #[test]
    fn registry_names_follow_functions() {
        let registry = registry();
        assert_eq!(registry.first().map(|t| t.name), Some("lucky_number"));
        assert!(registry.find("BoringArithmetic").is_some_and(|t| t.is_boring()));
        assert!(registry.find("Overflow_DISABLED").is_some_and(|t| t.is_disabled()));
    }
}
