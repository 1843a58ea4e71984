use crate::attempt::Attempt;
use crate::outcome::Flow;

/// Signature of every registered test body.
pub type TestFn = fn(&mut Attempt) -> Flow;

/// A registered test: name, declaring site and entry function.
#[derive(Debug, Clone, Copy)]
pub struct TestCase {
    pub name: &'static str,
    pub file: &'static str,
    pub line: u32,
    pub entry: TestFn,
}

impl TestCase {
    pub const fn new(name: &'static str, file: &'static str, line: u32, entry: TestFn) -> Self {
        Self {
            name,
            file,
            line,
            entry,
        }
    }

    /// Boring tests only run when asked for explicitly.
    pub fn is_boring(&self) -> bool {
        self.name.contains("Boring") || self.name.contains("BORING")
    }

    /// Disabled tests are skipped by run-all unless disabled tests are requested.
    pub fn is_disabled(&self) -> bool {
        self.name.contains("Disabled") || self.name.contains("DISABLED")
    }

    /// Final component of the declaring file, used in replay directory layouts.
    pub fn file_basename(&self) -> &'static str {
        self.file.rsplit(['/', '\\']).next().unwrap_or(self.file)
    }
}

/// Registered tests in declaration order.
#[derive(Debug, Clone, Default)]
pub struct TestRegistry {
    tests: Vec<TestCase>,
}

impl TestRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, test: TestCase) -> &mut Self {
        self.tests.push(test);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &TestCase> {
        self.tests.iter()
    }

    pub fn find(&self, name: &str) -> Option<&TestCase> {
        self.tests.iter().find(|t| t.name == name)
    }

    /// First test whose name starts with `prefix`.
    pub fn find_prefix(&self, prefix: &str) -> Option<&TestCase> {
        self.tests.iter().find(|t| t.name.starts_with(prefix))
    }

    pub fn first(&self) -> Option<&TestCase> {
        self.tests.first()
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

impl FromIterator<TestCase> for TestRegistry {
    fn from_iter<I: IntoIterator<Item = TestCase>>(iter: I) -> Self {
        Self {
            tests: iter.into_iter().collect(),
        }
    }
}

/// Build a [`TestCase`] for a test function, recording where it is declared.
#[macro_export]
macro_rules! test_case {
    ($entry:path) => {
        $crate::registry::TestCase::new(stringify!($entry), file!(), line!(), $entry)
    };
}
