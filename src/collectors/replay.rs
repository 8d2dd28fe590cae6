//! Replay of newline-delimited JSON packet observations (one object per line).

use super::{PacketObservation, PacketSource};
use crate::error::Result;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{info, warn};

pub struct ReplaySource {
    name: String,
    lines: std::io::Lines<Box<dyn BufRead + Send>>,
    line_no: usize,
    emitted: usize,
    skipped: usize,
    finished: bool,
}

impl ReplaySource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        info!(path = %path.display(), "replaying packet observations");
        Ok(Self::from_reader(path.display().to_string(), BufReader::new(file)))
    }

    pub fn from_reader(name: impl Into<String>, reader: impl BufRead + Send + 'static) -> Self {
        let reader: Box<dyn BufRead + Send> = Box::new(reader);
        Self {
            name: name.into(),
            lines: reader.lines(),
            line_no: 0,
            emitted: 0,
            skipped: 0,
            finished: false,
        }
    }

    /// Lines dropped as malformed so far.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for ReplaySource {
    type Item = PacketObservation;

    fn next(&mut self) -> Option<PacketObservation> {
        if self.finished {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    warn!(source = %self.name, line = self.line_no + 1, error = %e, "replay read failed");
                    self.finished = true;
                    return None;
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };
            self.line_no += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<PacketObservation>(trimmed) {
                Ok(obs) => {
                    self.emitted += 1;
                    return Some(obs);
                }
                Err(e) => {
                    self.skipped += 1;
                    warn!(source = %self.name, line = self.line_no, error = %e, "dropping malformed observation");
                }
            }
        }
    }
}

impl Drop for ReplaySource {
    fn drop(&mut self) {
        if self.line_no > 0 {
            info!(
                source = %self.name,
                emitted = self.emitted,
                skipped = self.skipped,
                "replay finished"
            );
        }
    }
}

impl PacketSource for ReplaySource {
    fn name(&self) -> &str {
        &self.name
    }
}
