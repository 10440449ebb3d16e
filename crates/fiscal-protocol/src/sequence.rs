//! Per-dialect packet sequence counters
//!
//! Every packet built by a byte dialect draws one sequence byte. Counters are
//! process-wide and advance whether or not the packet is ever sent, wrapping
//! inside the dialect range.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::Dialect;

/// Wrapping sequence counter over an inclusive byte range
#[derive(Debug)]
pub struct SequenceCounter {
    current: AtomicU8,
    first: u8,
    last: u8,
}

impl SequenceCounter {
    /// Create a counter starting at `first` and wrapping after `last`
    pub const fn new(first: u8, last: u8) -> Self {
        Self {
            current: AtomicU8::new(first),
            first,
            last,
        }
    }

    /// Take the current value and advance
    pub fn next(&self) -> u8 {
        let (first, last) = (self.first, self.last);
        match self
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| {
                Some(if v >= last || v < first { first } else { v + 1 })
            }) {
            Ok(v) | Err(v) => v,
        }
    }

    /// Value the next packet will receive
    pub fn peek(&self) -> u8 {
        self.current.load(Ordering::Acquire)
    }

    /// Whether `value` lies in this counter's range
    pub fn contains(&self, value: u8) -> bool {
        (self.first..=self.last).contains(&value)
    }

    /// First value of the range
    pub fn first(&self) -> u8 {
        self.first
    }

    /// Last value of the range
    pub fn last(&self) -> u8 {
        self.last
    }
}

static HASAR: SequenceCounter = SequenceCounter::new(0x20, 0x7F);
static EPSON: SequenceCounter = SequenceCounter::new(0x20, 0x7F);
// 0x80 is the intermediate packet marker
static EPSON_EXT: SequenceCounter = SequenceCounter::new(0x81, 0xFF);

/// Shared counter of a byte dialect
pub fn counter(dialect: Dialect) -> Option<&'static SequenceCounter> {
    match dialect {
        Dialect::Hasar => Some(&HASAR),
        Dialect::Epson => Some(&EPSON),
        Dialect::EpsonExt => Some(&EPSON_EXT),
        Dialect::Hasar2G => None,
    }
}

/// Draw the next sequence byte for a byte dialect
pub fn next_sequence(dialect: Dialect) -> u8 {
    counter(dialect).map(SequenceCounter::next).unwrap_or(0)
}
