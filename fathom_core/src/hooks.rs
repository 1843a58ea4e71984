//! Named entry points an external symbolic executor intercepts.
//!
//! The table maps stable names to the functions it may redefine, so the
//! integration never depends on symbol names surviving the compiler.

use crate::attempt::{Attempt, Backend};
use crate::outcome::Flow;
use crate::range;
use std::fmt;

/// A hookable entry point, typed by its signature.
#[derive(Clone, Copy)]
pub enum Hook {
    Control(fn(&mut Attempt) -> Flow),
    ControlWithReason(fn(&mut Attempt, &str) -> Flow),
    Mark(fn(&mut Attempt)),
    Assume(fn(&mut Attempt, bool) -> Flow),
    Pointer(fn(&Attempt) -> *const u8),
    Index(fn(&Attempt) -> usize),
    Flag(fn(&Attempt) -> bool),
    Concretize(for<'a> fn(&Attempt, &'a [u8]) -> &'a [u8]),
    SymbolicQuery(fn(u32) -> bool),
    Unsigned(fn(u32) -> u32),
    Signed(fn(i32) -> i32),
    Unsigned64(fn(u64) -> u64),
    Signed64(fn(i64) -> i64),
}

impl Hook {
    /// Code address of the entry point.
    pub fn address(&self) -> usize {
        match *self {
            Hook::Control(f) => f as usize,
            Hook::ControlWithReason(f) => f as usize,
            Hook::Mark(f) => f as usize,
            Hook::Assume(f) => f as usize,
            Hook::Pointer(f) => f as usize,
            Hook::Index(f) => f as usize,
            Hook::Flag(f) => f as usize,
            Hook::Concretize(f) => f as usize,
            Hook::SymbolicQuery(f) => f as usize,
            Hook::Unsigned(f) => f as usize,
            Hook::Signed(f) => f as usize,
            Hook::Unsigned64(f) => f as usize,
            Hook::Signed64(f) => f as usize,
        }
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hook({:#x})", self.address())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HookEntry {
    pub name: &'static str,
    pub hook: Hook,
}

#[inline(never)]
fn pass(attempt: &mut Attempt) -> Flow {
    attempt.pass()
}

#[inline(never)]
fn fail(attempt: &mut Attempt, reason: &str) -> Flow {
    attempt.fail(reason)
}

#[inline(never)]
fn soft_fail(attempt: &mut Attempt) {
    attempt.soft_fail()
}

#[inline(never)]
fn abandon(attempt: &mut Attempt, reason: &str) -> Flow {
    attempt.abandon(reason)
}

#[inline(never)]
fn assume(attempt: &mut Attempt, cond: bool) -> Flow {
    attempt.assume(cond)
}

fn input_begin(attempt: &Attempt) -> *const u8 {
    attempt.input().bounds().0
}

fn input_end(attempt: &Attempt) -> *const u8 {
    attempt.input().bounds().1
}

fn input_index(attempt: &Attempt) -> usize {
    attempt.input().cursor()
}

fn using_sym_exec(attempt: &Attempt) -> bool {
    attempt.backend() == Backend::Symbolic
}

fn concretize_data<'a>(attempt: &Attempt, data: &'a [u8]) -> &'a [u8] {
    attempt.concretize(data)
}

pub static HOOK_TABLE: [HookEntry; 19] = [
    // Control flow during the test.
    HookEntry { name: "Pass", hook: Hook::Control(pass) },
    HookEntry { name: "Fail", hook: Hook::ControlWithReason(fail) },
    HookEntry { name: "SoftFail", hook: Hook::Mark(soft_fail) },
    HookEntry { name: "Abandon", hook: Hook::ControlWithReason(abandon) },
    // Source of symbolic bytes.
    HookEntry { name: "InputBegin", hook: Hook::Pointer(input_begin) },
    HookEntry { name: "InputEnd", hook: Hook::Pointer(input_end) },
    HookEntry { name: "InputIndex", hook: Hook::Index(input_index) },
    // Solver APIs.
    HookEntry { name: "Assume", hook: Hook::Assume(assume) },
    HookEntry { name: "IsSymbolicUInt", hook: Hook::SymbolicQuery(range::is_symbolic_uint) },
    HookEntry { name: "ConcretizeData", hook: Hook::Concretize(concretize_data) },
    HookEntry { name: "MinUInt", hook: Hook::Unsigned(range::min_uint) },
    HookEntry { name: "MaxUInt", hook: Hook::Unsigned(range::max_uint) },
    HookEntry { name: "MinInt", hook: Hook::Signed(range::min_int) },
    HookEntry { name: "MaxInt", hook: Hook::Signed(range::max_int) },
    HookEntry { name: "MinUInt64", hook: Hook::Unsigned64(range::min_uint64) },
    HookEntry { name: "MaxUInt64", hook: Hook::Unsigned64(range::max_uint64) },
    HookEntry { name: "MinInt64", hook: Hook::Signed64(range::min_int64) },
    HookEntry { name: "MaxInt64", hook: Hook::Signed64(range::max_int64) },
    HookEntry { name: "UsingSymExec", hook: Hook::Flag(using_sym_exec) },
];

pub fn lookup(name: &str) -> Option<Hook> {
    HOOK_TABLE
        .iter()
        .find(|entry| entry.name == name)
        .map(|entry| entry.hook)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::{AbandonReason, Escape};
    use std::collections::HashSet;

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = HOOK_TABLE.iter().map(|e| e.name).collect();
        assert_eq!(names.len(), HOOK_TABLE.len());
    }

    #[test]
    fn control_hooks_behave_like_the_attempt_methods() {
        let mut attempt = Attempt::default();
        attempt.begin_with(&[1, 2]);
        let Some(Hook::Control(pass)) = lookup("Pass") else {
            panic!("Pass hook missing");
        };
        assert_eq!(pass(&mut attempt), Err(Escape::Pass));

        let Some(Hook::ControlWithReason(abandon)) = lookup("Abandon") else {
            panic!("Abandon hook missing");
        };
        assert_eq!(
            abandon(&mut attempt, "nope"),
            Err(Escape::Abandon(AbandonReason::Requested("nope".into())))
        );

        let Some(Hook::Mark(soft_fail)) = lookup("SoftFail") else {
            panic!("SoftFail hook missing");
        };
        soft_fail(&mut attempt);
        assert!(attempt.soft_failed());
    }

    #[test]
    fn input_hooks_expose_buffer_and_cursor() {
        let mut attempt = Attempt::default();
        attempt.begin_with(&[9, 9, 9]);
        attempt.u16().unwrap();
        let Some(Hook::Index(index)) = lookup("InputIndex") else {
            panic!("InputIndex hook missing");
        };
        assert_eq!(index(&attempt), 2);

        let (Some(Hook::Pointer(begin)), Some(Hook::Pointer(end))) =
            (lookup("InputBegin"), lookup("InputEnd"))
        else {
            panic!("Input bounds hooks missing");
        };
        assert_eq!(
            end(&attempt) as usize - begin(&attempt) as usize,
            attempt.input().capacity()
        );
    }

    #[test]
    fn extremization_hooks_are_identities() {
        let Some(Hook::Unsigned(min)) = lookup("MinUInt") else {
            panic!("MinUInt hook missing");
        };
        assert_eq!(min(17), 17);
        let Some(Hook::Signed(max)) = lookup("MaxInt") else {
            panic!("MaxInt hook missing");
        };
        assert_eq!(max(-4), -4);
        let Some(Hook::SymbolicQuery(is_symbolic)) = lookup("IsSymbolicUInt") else {
            panic!("IsSymbolicUInt hook missing");
        };
        assert!(!is_symbolic(3));
        assert_ne!(lookup("MinUInt64").map(|h| h.address()), Some(0));
        assert!(lookup("Missing").is_none());
    }
}
