use crate::outcome::Verdict;
use rand::RngCore;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffixes a saved case file may carry.
pub const CASE_SUFFIXES: [&str; 3] = ["pass", "fail", "crash"];

/// Number of random bytes behind a case identifier (40 hex characters).
const CASE_ID_BYTES: usize = 20;

/// Defines errors that can arise while saving or loading test cases.
#[derive(Error, Debug)]
pub enum CorpusError {
    /// An I/O error occurred while touching the case directory or a case file.
    /// Contains a string describing the underlying I/O error.
    #[error("Corpus I/O error: {0}")]
    Io(String),

    /// Abandoned attempts carry no verdict worth replaying.
    #[error("Refusing to save a case with verdict {0}")]
    UnsavableVerdict(Verdict),

    /// A directory expected to hold saved cases does not exist.
    #[error("Case directory {0:?} does not exist")]
    MissingDirectory(PathBuf),
}

impl From<io::Error> for CorpusError {
    fn from(err: io::Error) -> Self {
        CorpusError::Io(err.to_string())
    }
}

/// A saved test case: the exact bytes an attempt consumed, plus the
/// verdict encoded in its file suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedCase {
    /// File name, `<40 hex chars>.<suffix>`.
    pub name: String,
    pub verdict: Verdict,
    pub bytes: Vec<u8>,
}

/// Defines the common interface for a place saved test cases go.
///
/// The supervisor persists failing and crashing attempts (and, when asked,
/// passing ones) through this trait without caring whether the cases land
/// on disk or stay in memory.
pub trait CaseStore {
    /// Stores `bytes` under a fresh random name carrying the suffix for `verdict`.
    ///
    /// # Returns
    /// The name the case was stored under, or a `CorpusError` if the verdict
    /// has no suffix or the write fails.
    fn save(&mut self, verdict: Verdict, bytes: &[u8]) -> Result<String, CorpusError>;

    /// Number of cases saved so far.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A fresh 40-hex-character case identifier.
pub fn fresh_case_id() -> String {
    let mut id = [0u8; CASE_ID_BYTES];
    rand::rng().fill_bytes(&mut id);
    hex::encode(id)
}

fn case_file_name(verdict: Verdict) -> Result<String, CorpusError> {
    let suffix = verdict
        .case_suffix()
        .ok_or(CorpusError::UnsavableVerdict(verdict))?;
    Ok(format!("{}.{}", fresh_case_id(), suffix))
}

/// An in-memory implementation of the `CaseStore` trait.
///
/// Keeps every saved case in a `Vec`. Used by tests and by embedders that
/// want to inspect what a run would have written.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    cases: Vec<SavedCase>,
}

impl InMemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cases(&self) -> &[SavedCase] {
        &self.cases
    }
}

impl CaseStore for InMemoryCorpus {
    fn save(&mut self, verdict: Verdict, bytes: &[u8]) -> Result<String, CorpusError> {
        let name = case_file_name(verdict)?;
        self.cases.push(SavedCase {
            name: name.clone(),
            verdict,
            bytes: bytes.to_vec(),
        });
        Ok(name)
    }

    fn len(&self) -> usize {
        self.cases.len()
    }
}

/// An on-disk implementation of the `CaseStore` trait.
///
/// Each case is one flat file in the output directory containing exactly the
/// consumed bytes, with no header or encoding.
#[derive(Debug)]
pub struct OnDiskCorpus {
    /// Directory the case files are written to.
    dir: PathBuf,
    saved: usize,
}

impl OnDiskCorpus {
    /// Opens `dir` as an output directory, creating it if it does not exist.
    pub fn new(dir: PathBuf) -> Result<Self, CorpusError> {
        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                CorpusError::Io(format!(
                    "Failed to create output directory at {dir:?}: {e}"
                ))
            })?;
        } else if !dir.is_dir() {
            return Err(CorpusError::Io(format!(
                "Output path {dir:?} exists but is not a directory"
            )));
        }
        Ok(Self { dir, saved: 0 })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl CaseStore for OnDiskCorpus {
    fn save(&mut self, verdict: Verdict, bytes: &[u8]) -> Result<String, CorpusError> {
        let name = case_file_name(verdict)?;
        let path = self.dir.join(&name);
        let mut file = File::create(&path)
            .map_err(|e| CorpusError::Io(format!("Failed to create case file {path:?}: {e}")))?;
        file.write_all(bytes)
            .map_err(|e| CorpusError::Io(format!("Failed to write case file {path:?}: {e}")))?;
        self.saved += 1;
        Ok(name)
    }

    fn len(&self) -> usize {
        self.saved
    }
}

/// Whether `name` looks like a saved case: the text after the last `.` must
/// be one of the case suffixes.
pub fn is_test_case_file(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((_, suffix)) => CASE_SUFFIXES.contains(&suffix),
        None => false,
    }
}

/// Verdict recorded in a case file's name, if any.
pub fn recorded_verdict(path: &Path) -> Option<Verdict> {
    let name = path.file_name()?.to_str()?;
    match name.rsplit_once('.')?.1 {
        "pass" => Some(Verdict::Passed),
        "fail" => Some(Verdict::Failed),
        "crash" => Some(Verdict::Crashed),
        _ => None,
    }
}

/// Result of reading a case file into an input buffer of bounded capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedCase {
    pub bytes: Vec<u8>,
    /// Set when the file held more bytes than the capacity allowed.
    pub truncated: bool,
}

/// Reads at most `capacity` bytes of a case file.
pub fn read_case(path: &Path, capacity: usize) -> Result<LoadedCase, CorpusError> {
    let file = File::open(path)
        .map_err(|e| CorpusError::Io(format!("Failed to open case file {path:?}: {e}")))?;
    read_limited(file, capacity)
}

/// Reads at most `capacity` bytes from any reader, such as standard input.
pub fn read_limited(reader: impl Read, capacity: usize) -> Result<LoadedCase, CorpusError> {
    let mut bytes = Vec::new();
    // One extra byte tells us whether anything was cut off.
    reader
        .take(capacity as u64 + 1)
        .read_to_end(&mut bytes)?;
    let truncated = bytes.len() > capacity;
    bytes.truncate(capacity);
    Ok(LoadedCase { bytes, truncated })
}

/// Directory holding the saved cases of one test:
/// `<root>/<source file basename>/<test name>`.
pub fn case_dir_for(root: &Path, file_basename: &str, test_name: &str) -> PathBuf {
    root.join(file_basename).join(test_name)
}

/// Saved case files directly under `dir`, sorted by name.
pub fn list_case_files(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    let mut files: Vec<PathBuf> = list_regular_files(dir)?
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(is_test_case_file)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Every regular file directly under `dir`, sorted by name. Subdirectories
/// are not traversed.
pub fn list_regular_files(dir: &Path) -> Result<Vec<PathBuf>, CorpusError> {
    if !dir.is_dir() {
        return Err(CorpusError::MissingDirectory(dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry_result in fs::read_dir(dir)
        .map_err(|e| CorpusError::Io(format!("Failed to read directory {dir:?}: {e}")))?
    {
        let entry = entry_result
            .map_err(|e| CorpusError::Io(format!("Error reading entry in {dir:?}: {e}")))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
