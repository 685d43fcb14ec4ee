//! Reader for the variable listing written by the traced program.
//!
//! Each line is `<name> <begin> <end>` with hexadecimal, inclusive
//! addresses. The producer may still be writing the file while it is read,
//! so a trailing line without newline is kept back until it is completed.

use super::{LoadStatus, Variables};
use crate::address;
use std::io::Read;
use std::path::PathBuf;

/// Accesses between two attempts to load the listing.
pub const DEFAULT_POLL_INTERVAL: u64 = 10_000;

/// Size of a single read from the listing.
pub const CHUNK_SIZE: usize = 256;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("expected <name> <begin> <end>, got {0:?}")]
    Fields(String),

    #[error("invalid hex address {value:?}")]
    Hex {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// One line of the listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Entry {
    pub name: String,
    pub begin: address,
    pub end: address,
}

fn parse_hex(value: &str) -> Result<address, ParseError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u64::from_str_radix(digits, 16).map_err(|source| ParseError::Hex {
        value: value.to_string(),
        source,
    })
}

impl std::str::FromStr for Entry {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields[..] {
            [name, begin, end] => Ok(Self {
                name: name.to_string(),
                begin: parse_hex(begin)?,
                end: parse_hex(end)?,
            }),
            _ => Err(ParseError::Fields(line.to_string())),
        }
    }
}

/// Incremental line reader over a listing.
#[derive(Debug)]
pub struct Listing<R> {
    reader: R,
    pending: Vec<u8>,
}

impl<R> Listing<R>
where
    R: Read,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
        }
    }

    /// Bytes of an incomplete trailing line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Reads one chunk and returns the lines it completed.
    ///
    /// Returns `None` once the reader is exhausted.
    pub fn next_chunk(&mut self) -> std::io::Result<Option<Vec<String>>> {
        let mut chunk = [0u8; CHUNK_SIZE];
        let num_read = loop {
            match self.reader.read(&mut chunk) {
                Ok(num_read) => break num_read,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        };
        if num_read == 0 {
            return Ok(None);
        }
        self.pending.extend_from_slice(&chunk[..num_read]);

        let mut lines = Vec::new();
        if let Some(last_newline) = self.pending.iter().rposition(|&b| b == b'\n') {
            let rest = self.pending.split_off(last_newline + 1);
            let complete = std::mem::replace(&mut self.pending, rest);
            lines.extend(
                String::from_utf8_lossy(&complete)
                    .lines()
                    .map(str::to_string),
            );
        }
        Ok(Some(lines))
    }

    /// Reads until the end and parses every complete line.
    ///
    /// Malformed lines are skipped.
    pub fn read_all(&mut self) -> std::io::Result<Vec<Entry>> {
        let mut entries = Vec::new();
        while let Some(lines) = self.next_chunk()? {
            for line in lines {
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<Entry>() {
                    Ok(entry) => entries.push(entry),
                    Err(err) => log::warn!("skipping variable listing line: {err}"),
                }
            }
        }
        if !self.pending.is_empty() {
            log::debug!(
                "variable listing ends in incomplete line {:?}",
                String::from_utf8_lossy(&self.pending)
            );
        }
        Ok(entries)
    }
}

/// Attempts to load the listing at a fixed cadence until it succeeds.
#[derive(Debug, Clone)]
pub struct Poller {
    path: PathBuf,
    every: u64,
    counter: u64,
}

impl Poller {
    pub fn new(path: impl Into<PathBuf>, every: u64) -> Self {
        Self {
            path: path.into(),
            every: every.max(1),
            counter: 0,
        }
    }

    /// Counts one access and attempts a load every `every` accesses.
    ///
    /// Returns the status of the attempt, or `None` if no attempt was
    /// made or it failed.
    pub fn tick(&mut self, variables: &mut Variables) -> Option<LoadStatus> {
        if variables.is_loaded() {
            return None;
        }
        self.counter += 1;
        if self.counter < self.every {
            return None;
        }
        self.counter = 0;
        self.poll(variables)
    }

    /// Attempts a load right away.
    pub fn poll(&mut self, variables: &mut Variables) -> Option<LoadStatus> {
        match variables.try_load(&self.path) {
            Ok(status) => {
                log::debug!("polled variable listing {:?}: {status:?}", self.path);
                Some(status)
            }
            Err(err) => {
                log::debug!("variable listing not available: {err}");
                None
            }
        }
    }
}
