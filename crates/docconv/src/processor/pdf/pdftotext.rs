//! Extraction through the poppler `pdftotext` command-line tool.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use crate::error::ExtractError;

use super::PdfStrategy;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct PdftotextStrategy {
    command: String,
    timeout: Duration,
}

impl PdftotextStrategy {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            timeout,
        }
    }
}

impl PdfStrategy for PdftotextStrategy {
    fn name(&self) -> &'static str {
        "pdftotext"
    }

    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let input = TempPath::new("pdf");
        std::fs::write(input.path(), bytes)?;
        let output = TempPath::new("txt");

        let spawned = Command::new(&self.command)
            .args(["-layout", "-enc", "UTF-8"])
            .arg(input.path())
            .arg(output.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ExtractError::ToolUnavailable(self.command.clone()));
            }
            Err(e) => {
                return Err(ExtractError::ToolFailed {
                    tool: self.command.clone(),
                    reason: e.to_string(),
                });
            }
        };

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Err(ExtractError::ToolFailed {
                    tool: self.command.clone(),
                    reason: format!("timed out after {:?}", self.timeout),
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if !status.success() {
            return Err(ExtractError::ToolFailed {
                tool: self.command.clone(),
                reason: format!("exited with {}", status),
            });
        }

        let raw = std::fs::read(output.path())?;
        let body = format_pages(&String::from_utf8_lossy(&raw));
        if body.is_empty() {
            return Err(ExtractError::NoText { skipped_pages: 0 });
        }
        Ok(body)
    }
}

/// Splits tool output on form feeds into `### Page N` sections, numbering
/// only the pages that carry text.
pub fn format_pages(output: &str) -> String {
    let mut out = String::new();
    let mut number = 0;
    for page in output.split('\x0c') {
        let lines: Vec<&str> = page.lines().map(str::trim_end).collect();
        let text = lines.join("\n");
        let text = text.trim_matches('\n');
        if text.trim().is_empty() {
            continue;
        }
        number += 1;
        out.push_str(&format!("### Page {}\n\n{}\n\n", number, text));
    }
    out
}

/// Temp file path removed on drop.
struct TempPath(PathBuf);

impl TempPath {
    fn new(extension: &str) -> Self {
        Self(std::env::temp_dir().join(format!(
            "docconv_pdftotext_{}.{}",
            uuid::Uuid::new_v4(),
            extension
        )))
    }

    fn path(&self) -> &Path {
        &self.0
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}
