use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::prompting::strip_prompt;

const DELIMITER_WIDTH: usize = 50;

/// Append-only text log of generation calls.
///
/// The file is opened, appended and closed on every call. One entry is a line
/// of `=`, the prompt, then for each result a line of `-` and the result with
/// the prompt removed.
#[derive(Debug, Clone)]
pub struct GenerationLog {
    path: PathBuf,
}

impl GenerationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, prompt: &str, results: &[String]) -> io::Result<()> {
        let entry = format_entry(prompt, results);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.as_bytes())
    }
}

pub fn format_entry(prompt: &str, results: &[String]) -> String {
    let mut entry = String::new();
    entry.push_str(&"=".repeat(DELIMITER_WIDTH));
    entry.push('\n');
    entry.push_str(prompt);
    entry.push('\n');
    for result in results {
        entry.push_str(&"-".repeat(DELIMITER_WIDTH));
        entry.push('\n');
        entry.push_str(&strip_prompt(result, prompt));
        entry.push('\n');
    }
    entry
}
