//! Per-sequence include/exclude/ignore state for one weave traversal (§4.2).

use std::collections::HashSet;

use crate::delta::DeltaTable;
use crate::errors::Result;
use crate::sid::SeqNo;

/// The resolved set of sequences that are, and are not, part of one target revision's text.
///
/// Built once per extraction from the target's ancestor chain (by `prev_seq`) plus whatever
/// the deltas along that chain themselves include/exclude/ignore, then further adjusted by any
/// caller-supplied `-i`/`-x` lists. [`WeaveReader`](crate::weave_reader::WeaveReader) consults
/// this on every body control line; it does no further graph walking of its own.
#[derive(Clone, Debug)]
pub struct SeqState {
    included: HashSet<SeqNo>,
    excluded: HashSet<SeqNo>,
    ignored: HashSet<SeqNo>,
    show_ignored: bool,
}

impl SeqState {
    /// Resolve the state for extracting `target` out of `table`, additionally honouring
    /// `extra_include`/`extra_exclude` (the caller's explicit `-i`/`-x` sequence lists) and
    /// `show_ignored` (the `-a` flag).
    pub fn for_target(
        table: &DeltaTable,
        target: SeqNo,
        extra_include: &[SeqNo],
        extra_exclude: &[SeqNo],
        show_ignored: bool,
    ) -> Result<SeqState> {
        let ancestors = table.ancestors(target)?;

        let mut included: HashSet<SeqNo> = ancestors.iter().copied().collect();
        let mut excluded: HashSet<SeqNo> = HashSet::new();
        let mut ignored: HashSet<SeqNo> = HashSet::new();

        for seq in &ancestors {
            // `ancestors` only ever returns sequences that are in `table` (it errors out
            // otherwise), so this lookup cannot fail.
            let delta = table.by_seq(*seq).expect("ancestor sequence must exist");
            included.extend(delta.included.seqs.iter().copied());
            excluded.extend(delta.excluded.seqs.iter().copied());
            ignored.extend(delta.ignored.seqs.iter().copied());
        }

        included.extend(extra_include.iter().copied());
        excluded.extend(extra_exclude.iter().copied());

        Ok(SeqState { included, excluded, ignored, show_ignored })
    }

    /// Whether `seq` is considered part of the target's text for the purpose of the weave
    /// suppression rule (§4.2): included, not excluded, and (unless `-a` was requested) not on
    /// an ignore list.
    pub fn is_effectively_included(&self, seq: SeqNo) -> bool {
        if !self.included.contains(&seq) {
            return false;
        }
        if self.excluded.contains(&seq) {
            return false;
        }
        if !self.show_ignored && self.ignored.contains(&seq) {
            return false;
        }
        true
    }

    /// Every sequence that contributed to inclusion and was not subsequently excluded —
    /// the Sids `Extract` reports as "effectively applied" (§4.4).
    pub fn applied_sequences(&self) -> Vec<SeqNo> {
        let mut out: Vec<SeqNo> =
            self.included.iter().copied().filter(|s| !self.excluded.contains(s)).collect();
        out.sort_unstable();
        out
    }
}
