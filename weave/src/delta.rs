//! Delta records and the delta table.

use crate::date::Date;
use crate::errors::{Error, Result};
use crate::sid::{SeqNo, Sid};

/// The letter stored in a delta's `^Ad` line.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DeltaKind {
    /// `D`: a normal, present revision.
    Delta,
    /// `R`: soft-deleted by `rmdel`. Still occupies a sequence and still appears in the
    /// delta table, but its text is no longer reachable through extraction.
    Removed,
    /// Any other single letter, preserved verbatim so that round-tripping a file we don't
    /// fully understand doesn't lose information.
    Unknown(char),
}

impl DeltaKind {
    pub fn letter(&self) -> char {
        match self {
            DeltaKind::Delta => 'D',
            DeltaKind::Removed => 'R',
            DeltaKind::Unknown(c) => *c,
        }
    }

    pub fn from_letter(c: char) -> DeltaKind {
        match c {
            'D' => DeltaKind::Delta,
            'R' => DeltaKind::Removed,
            other => DeltaKind::Unknown(other),
        }
    }
}

/// One of the three optional sequence sets (`included`/`excluded`/`ignored`) a delta may
/// carry. `present` distinguishes "this list was written, and is empty" from "this list was
/// never written at all" (§3.2).
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct SeqSet {
    pub present: bool,
    pub seqs: Vec<SeqNo>,
}

impl SeqSet {
    pub fn absent() -> SeqSet {
        SeqSet::default()
    }

    pub fn of(seqs: Vec<SeqNo>) -> SeqSet {
        SeqSet { present: true, seqs }
    }
}

/// A single historical revision.
#[derive(Clone, Debug)]
pub struct Delta {
    pub kind: DeltaKind,
    pub sid: Sid,
    pub date: Date,
    pub user: String,
    pub seq: SeqNo,
    pub prev_seq: SeqNo,
    pub inserted: u32,
    pub deleted: u32,
    pub unchanged: u32,
    pub included: SeqSet,
    pub excluded: SeqSet,
    pub ignored: SeqSet,
    pub mrs: Vec<String>,
    pub comments: Vec<String>,
}

impl Delta {
    pub fn is_removed(&self) -> bool {
        matches!(self.kind, DeltaKind::Removed)
    }
}

/// The ordered collection of every delta in a history file, newest-first by `seq` (§3.3).
#[derive(Clone, Debug, Default)]
pub struct DeltaTable {
    /// Newest-first, matching on-disk order.
    deltas: Vec<Delta>,
}

impl DeltaTable {
    pub fn new() -> DeltaTable {
        DeltaTable { deltas: Vec::new() }
    }

    pub fn from_deltas(deltas: Vec<Delta>) -> DeltaTable {
        DeltaTable { deltas }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Delta> {
        self.deltas.iter()
    }

    pub fn len(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }

    pub fn by_seq(&self, seq: SeqNo) -> Option<&Delta> {
        self.deltas.iter().find(|d| d.seq == seq)
    }

    pub fn by_seq_mut(&mut self, seq: SeqNo) -> Option<&mut Delta> {
        self.deltas.iter_mut().find(|d| d.seq == seq)
    }

    pub fn by_sid(&self, sid: Sid) -> Option<&Delta> {
        self.deltas.iter().find(|d| d.sid == sid)
    }

    pub fn max_seq(&self) -> SeqNo {
        self.deltas.iter().map(|d| d.seq).max().unwrap_or(0)
    }

    /// Branch numbers already used at the given `release.level`, for picking the next free
    /// branch when forcing a new branch off of a trunk delta.
    pub fn branches_at(&self, release: u32, level: u32) -> Vec<u32> {
        self.deltas
            .iter()
            .filter(|d| d.sid.release == release && d.sid.level == level && d.sid.branch != 0)
            .map(|d| d.sid.branch)
            .collect()
    }

    /// Prepend a freshly recorded delta (or synthesized null delta); the table stays
    /// newest-first.
    pub fn prepend(&mut self, delta: Delta) {
        self.deltas.insert(0, delta);
    }

    /// Walk the `prev_seq` chain from `seq` back to the root, inclusive, newest first.
    pub fn ancestors(&self, seq: SeqNo) -> Result<Vec<SeqNo>> {
        let mut out = Vec::new();
        let mut cur = seq;
        loop {
            let d = self.by_seq(cur).ok_or(Error::DanglingSequence(cur))?;
            out.push(d.seq);
            if d.prev_seq == 0 {
                break;
            }
            cur = d.prev_seq;
        }
        Ok(out)
    }

    /// Leaf deltas: those no other delta names as its `prev_seq`. `rmdel` may only remove a
    /// leaf.
    pub fn is_leaf(&self, seq: SeqNo) -> bool {
        !self.deltas.iter().any(|d| d.prev_seq == seq)
    }

    /// Check the structural invariants from §3.2: unique sequences, `prev_seq` pointing
    /// strictly backward to an existing delta (except the root), and every referenced
    /// sequence in an include/exclude/ignore set existing in the table.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for d in &self.deltas {
            if !seen.insert(d.seq) {
                return Err(Error::Malformed(format!("duplicate sequence {}", d.seq)));
            }
        }
        for d in &self.deltas {
            if d.prev_seq != 0 {
                if d.prev_seq >= d.seq {
                    return Err(Error::Malformed(format!(
                        "delta {} has prev_seq {} which is not older",
                        d.seq, d.prev_seq
                    )));
                }
                if self.by_seq(d.prev_seq).is_none() {
                    return Err(Error::DanglingSequence(d.prev_seq));
                }
            }
            for set in [&d.included, &d.excluded, &d.ignored] {
                for s in &set.seqs {
                    if self.by_seq(*s).is_none() {
                        return Err(Error::DanglingSequence(*s));
                    }
                }
            }
        }
        Ok(())
    }
}
