//! Streams body lines, tagging each with its effective delta (§4.2).

use std::io::BufRead;

use crate::codec::{BodyCursor, BodyLine, Ctrl};
use crate::errors::{Error, Result};
use crate::seqstate::SeqState;
use crate::sid::SeqNo;

/// One line of the body, as classified by a single pass of the [`WeaveReader`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WeaveEvent {
    /// A data line that belongs to the target revision's text. `author` is the sequence of the
    /// innermost open `^AI` region — the delta that introduced this line.
    Emit { author: SeqNo, data: Vec<u8> },
    /// A data line present in the body, but not part of the target revision.
    Suppressed { data: Vec<u8> },
    /// A control marker, passed through unchanged so a caller rebuilding the body (see
    /// `sccs`'s `DeltaRecord`) can replicate the original structure exactly.
    Marker(Ctrl, SeqNo),
}

/// Running counts of emitted/suppressed lines, used to fill in a new delta's
/// `inserted`/`deleted`/`unchanged` counters when nothing changed (the round-trip-extract
/// property, §8).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WeaveStats {
    pub emitted: u32,
    pub suppressed: u32,
}

struct OpenRegion {
    ctrl: Ctrl,
    seq: SeqNo,
    suppresses: bool,
}

/// Drives a [`BodyCursor`] through the include/exclude/ignore rules of a [`SeqState`],
/// yielding one [`WeaveEvent`] per body line.
pub struct WeaveReader<'s, R> {
    cursor: BodyCursor<R>,
    state: &'s SeqState,
    stack: Vec<OpenRegion>,
    stats: WeaveStats,
}

impl<'s, R: BufRead> WeaveReader<'s, R> {
    pub fn new(cursor: BodyCursor<R>, state: &'s SeqState) -> WeaveReader<'s, R> {
        WeaveReader { cursor, state, stack: Vec::new(), stats: WeaveStats::default() }
    }

    pub fn stats(&self) -> WeaveStats {
        self.stats
    }

    /// Whether any currently open region suppresses emission of a data line appearing here.
    fn currently_suppressed(&self) -> bool {
        self.stack.iter().any(|r| r.suppresses)
    }

    /// The innermost open `^AI` region's sequence, used as the "author delta" of an emitted
    /// line.
    fn innermost_insert(&self) -> SeqNo {
        self.stack.iter().rev().find(|r| r.ctrl == Ctrl::Insert).map(|r| r.seq).unwrap_or(0)
    }

    /// Read and classify the next body line. Returns `Ok(None)` at end of file, after checking
    /// that every opened region was closed (the weave-well-formedness property, §8).
    pub fn next_event(&mut self) -> Result<Option<WeaveEvent>> {
        let line = match self.cursor.next_line()? {
            None => {
                if let Some(open) = self.stack.last() {
                    return Err(Error::UnterminatedRegion(open.seq));
                }
                return Ok(None);
            }
            Some(line) => line,
        };

        match line {
            BodyLine::Data(data) => {
                if self.currently_suppressed() {
                    self.stats.suppressed += 1;
                    Ok(Some(WeaveEvent::Suppressed { data }))
                } else {
                    self.stats.emitted += 1;
                    Ok(Some(WeaveEvent::Emit { author: self.innermost_insert(), data }))
                }
            }
            BodyLine::Control(Ctrl::End, seq) => {
                match self.stack.last() {
                    Some(open) if open.seq == seq => {
                        self.stack.pop();
                    }
                    Some(_) => return Err(Error::MismatchedClose(seq)),
                    None => return Err(Error::MismatchedClose(seq)),
                }
                Ok(Some(WeaveEvent::Marker(Ctrl::End, seq)))
            }
            BodyLine::Control(ctrl, seq) => {
                let suppresses = match ctrl {
                    Ctrl::Insert => !self.state.is_effectively_included(seq),
                    Ctrl::Delete => self.state.is_effectively_included(seq),
                    Ctrl::End => unreachable!("handled above"),
                };
                self.stack.push(OpenRegion { ctrl, seq, suppresses });
                Ok(Some(WeaveEvent::Marker(ctrl, seq)))
            }
        }
    }

    /// Drain the remainder of the body, returning only the emitted data lines' bytes in order
    /// (the reconstructed text of the target revision).
    pub fn extract_lines(mut self) -> Result<(Vec<Vec<u8>>, WeaveStats)> {
        let mut out = Vec::new();
        while let Some(event) = self.next_event()? {
            if let WeaveEvent::Emit { data, .. } = event {
                out.push(data);
            }
        }
        Ok((out, self.stats()))
    }
}
