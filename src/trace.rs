//! Text traces of memory accesses.
//!
//! One access per line: `<op> <hex address> <size> [<file> <function> <line>]`
//! where `op` is `I` (instruction fetch), `R` (read), `W` (write) or `M`
//! (modify, counted once as a write). Blank lines and lines starting with
//! `#` are ignored.

use crate::variable::Poller;
use crate::{address, sim};
use stats::{AccessKind, SourceLocation};
use std::io::BufRead;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown operation {0:?}")]
    Op(String),

    #[error("invalid address {0:?}")]
    Address(String),

    #[error("invalid size {0:?}")]
    Size(String),

    #[error("invalid line number {0:?}")]
    Line(String),

    #[error("expected <op> <address> <size> [<file> <function> <line>], got {0:?}")]
    Fields(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error("line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: ParseError,
    },

    #[error("line {line}: {source}")]
    Simulate {
        line: usize,
        #[source]
        source: sim::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    INST_FETCH,
    READ,
    WRITE,
    MODIFY,
}

impl Op {
    /// Kind of the simulated access.
    #[must_use]
    pub fn kind(self) -> AccessKind {
        match self {
            Op::INST_FETCH => AccessKind::INST_FETCH,
            Op::READ => AccessKind::DATA_READ,
            Op::WRITE | Op::MODIFY => AccessKind::DATA_WRITE,
        }
    }
}

impl std::str::FromStr for Op {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "I" => Ok(Op::INST_FETCH),
            "R" => Ok(Op::READ),
            "W" => Ok(Op::WRITE),
            "M" => Ok(Op::MODIFY),
            other => Err(ParseError::Op(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event {
    pub op: Op,
    pub addr: address,
    pub size: u32,
    pub location: Option<SourceLocation>,
}

impl std::str::FromStr for Event {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        let (op, addr, size, location) = match fields[..] {
            [op, addr, size] => (op, addr, size, None),
            [op, addr, size, file, func, line_num] => {
                let line_num = line_num
                    .parse()
                    .map_err(|_| ParseError::Line(line_num.to_string()))?;
                (
                    op,
                    addr,
                    size,
                    Some(SourceLocation::new(file, func, line_num)),
                )
            }
            _ => return Err(ParseError::Fields(line.to_string())),
        };
        let digits = addr.trim_start_matches("0x");
        Ok(Self {
            op: op.parse()?,
            addr: u64::from_str_radix(digits, 16)
                .map_err(|_| ParseError::Address(addr.to_string()))?,
            size: size
                .parse()
                .map_err(|_| ParseError::Size(size.to_string()))?,
            location,
        })
    }
}

/// Parses the event on a trace line, if any.
pub fn parse_line(line: &str) -> Option<Result<Event, ParseError>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    Some(line.parse())
}

/// Replays every event of a trace.
///
/// The poller, if any, is ticked once per event.
///
/// # Returns
/// The number of simulated accesses.
pub fn replay<R>(
    reader: R,
    sim: &mut sim::Simulator,
    mut poller: Option<&mut Poller>,
) -> Result<u64, ReplayError>
where
    R: BufRead,
{
    let mut num_accesses = 0;
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line_num = idx + 1;
        let Some(event) = parse_line(&line) else {
            continue;
        };
        let event = event.map_err(|source| ReplayError::Parse {
            line: line_num,
            source,
        })?;
        if let Some(poller) = poller.as_deref_mut() {
            poller.tick(sim.variables_mut());
        }
        sim.access(
            event.addr,
            event.size,
            event.op.kind(),
            event.location.as_ref(),
        )
        .map_err(|source| ReplayError::Simulate {
            line: line_num,
            source,
        })?;
        num_accesses += 1;
    }
    log::info!("replayed {num_accesses} accesses");
    Ok(num_accesses)
}
