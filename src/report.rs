//! `Prs`/`Prt`/`Rmdel`/`Cdc`/`Val`: metadata reporting, soft-deletion, comment editing, and
//! structural validation (§4.9).
//!
//! None of these touch the body; `Rmdel` and `Cdc` rewrite only the delta table, by the same
//! load/mutate/`HistoryCodec::write` pattern `Admin` uses for flags and the user list.

use std::collections::HashSet;
use std::fmt::Write as _;

use sccs_naming::{FileLock, HistoryName};
use sccs_weave::{BodyLine, Ctrl, Delta, HistoryCodec, Sid};

use crate::errors::{Error, Result};

/// Formats one or more deltas as a fixed-field table (§4.9): the classical `prs`/`sccs prt`
/// data-spec mini-language is a CLI-facing concern out of scope for the core, so the field set
/// here is reduced to a fixed list (Sid, date, user, counts, MRs, comments).
pub struct Prs;

impl Prs {
    /// Render one delta: Sid, date, user, counts, MRs, and comments, one line each, matching
    /// the order a caller would want to print them in.
    pub fn format_one(delta: &Delta) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<12} {} {}  {}/{}/{}",
            delta.sid, delta.date, delta.user, delta.inserted, delta.deleted, delta.unchanged
        );
        for mr in &delta.mrs {
            let _ = writeln!(out, "MRs:\t{}", mr);
        }
        for comment in &delta.comments {
            let _ = writeln!(out, "\t{}", comment);
        }
        out
    }

    /// Render a subset of deltas, in the order given.
    pub fn format_many<'a>(deltas: impl IntoIterator<Item = &'a Delta>) -> String {
        deltas.into_iter().map(Prs::format_one).collect()
    }
}

/// A convenience wrapper over [`Prs`] that prints every delta newest-first, matching the
/// classical no-arguments behaviour of `prs`/`sccs prt` (§4.9).
pub struct Prt;

impl Prt {
    pub fn run(name: &HistoryName) -> Result<String> {
        let (header, _checksum, _cursor) = HistoryCodec::read(name.s_file())?;
        Ok(Prs::format_many(header.delta_table.iter()))
    }
}

/// Soft-deletes the tip of a branch (§3.5, §4.9): flips a leaf delta's `kind` to `Removed`
/// without touching the body or any other delta.
pub struct Rmdel;

impl Rmdel {
    pub fn run(name: &HistoryName, sid: Sid) -> Result<()> {
        let _lock = FileLock::acquire(name)?;
        let (mut header, _checksum, cursor) = HistoryCodec::read(name.s_file())?;

        let seq = header
            .delta_table
            .iter()
            .find(|d| d.sid == sid)
            .map(|d| d.seq)
            .ok_or(Error::SidNotFound)?;

        if !header.delta_table.is_leaf(seq) {
            return Err(Error::NotALeaf(seq));
        }
        let delta = header.delta_table.by_seq_mut(seq).expect("looked up above");
        if delta.is_removed() {
            return Err(Error::NoAuthorisation(format!("delta {} is already removed", sid)));
        }
        delta.kind = sccs_weave::DeltaKind::Removed;

        rewrite(name, header, cursor)
    }
}

/// "Change delta commentary": replaces one existing delta's `mrs`/`comments` in place (§3.5,
/// §4.9). Does not touch `inserted`/`deleted`/`unchanged` or the body.
pub struct Cdc;

impl Cdc {
    pub fn run(name: &HistoryName, sid: Sid, mrs: Vec<String>, comments: Vec<String>) -> Result<()> {
        let _lock = FileLock::acquire(name)?;
        let (mut header, _checksum, cursor) = HistoryCodec::read(name.s_file())?;

        let delta = header
            .delta_table
            .iter()
            .find(|d| d.sid == sid)
            .map(|d| d.seq)
            .and_then(|seq| header.delta_table.by_seq_mut(seq))
            .ok_or(Error::SidNotFound)?;
        delta.mrs = mrs;
        delta.comments = comments;

        rewrite(name, header, cursor)
    }
}

fn rewrite(
    name: &HistoryName,
    header: sccs_weave::Header,
    mut cursor: sccs_weave::BodyCursor<std::io::BufReader<std::fs::File>>,
) -> Result<()> {
    let mut body = Vec::new();
    while let Some(line) = cursor.next_line()? {
        body.push(line);
    }
    HistoryCodec::write(name.s_file(), name.x_file(), &header, body)?;
    log::info!("rewrote delta metadata for {:?}", name.s_file());
    Ok(())
}

/// One structural invariant violation detected by [`Val::run`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ValFinding {
    DanglingPrevSeq { seq: u32, prev_seq: u32 },
    DanglingSetReference { seq: u32, referenced: u32 },
    DuplicateSeq { seq: u32 },
    UnterminatedRegion { seq: u32 },
    MismatchedClose { seq: u32 },
    ChecksumMismatch { stored: u16, computed: u16 },
}

impl std::fmt::Display for ValFinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValFinding::DanglingPrevSeq { seq, prev_seq } => {
                write!(f, "delta {} has prev_seq {} which names no delta", seq, prev_seq)
            }
            ValFinding::DanglingSetReference { seq, referenced } => {
                write!(f, "delta {} references sequence {} which names no delta", seq, referenced)
            }
            ValFinding::DuplicateSeq { seq } => write!(f, "sequence {} is used by more than one delta", seq),
            ValFinding::UnterminatedRegion { seq } => {
                write!(f, "body control region for sequence {} was never closed", seq)
            }
            ValFinding::MismatchedClose { seq } => {
                write!(f, "body control region close for sequence {} does not match any open region", seq)
            }
            ValFinding::ChecksumMismatch { stored, computed } => {
                write!(f, "stored checksum {:04x} does not match computed checksum {:04x}", stored, computed)
            }
        }
    }
}

/// A read-only structural validator (§3.2/§3.3/§3.4, §4.9): walks the delta table and the body
/// and reports every invariant violation it can detect in one pass, rather than failing on the
/// first one, so a caller can report everything wrong with a file at once.
pub struct Val;

impl Val {
    pub fn run(name: &HistoryName, check_checksum: bool) -> Result<Vec<ValFinding>> {
        let mut findings = Vec::new();

        let (header, stored_checksum, cursor) = HistoryCodec::read(name.s_file())?;
        let table = &header.delta_table;

        let mut seen = HashSet::new();
        for delta in table.iter() {
            if !seen.insert(delta.seq) {
                findings.push(ValFinding::DuplicateSeq { seq: delta.seq });
            }
        }
        for delta in table.iter() {
            if delta.prev_seq != 0 && table.by_seq(delta.prev_seq).is_none() {
                findings.push(ValFinding::DanglingPrevSeq { seq: delta.seq, prev_seq: delta.prev_seq });
            }
            for set in [&delta.included, &delta.excluded, &delta.ignored] {
                for referenced in &set.seqs {
                    if table.by_seq(*referenced).is_none() {
                        findings.push(ValFinding::DanglingSetReference {
                            seq: delta.seq,
                            referenced: *referenced,
                        });
                    }
                }
            }
        }

        let mut open: Vec<(Ctrl, u32)> = Vec::new();
        let mut c = cursor;
        loop {
            match c.next_line()? {
                None => break,
                Some(BodyLine::Data(_)) => (),
                Some(BodyLine::Control(Ctrl::End, seq)) => match open.last() {
                    Some(&(_, top)) if top == seq => {
                        open.pop();
                    }
                    _ => findings.push(ValFinding::MismatchedClose { seq }),
                },
                Some(BodyLine::Control(ctrl, seq)) => open.push((ctrl, seq)),
            }
        }
        for (_, seq) in open {
            findings.push(ValFinding::UnterminatedRegion { seq });
        }

        if check_checksum {
            if let Err(Error::Weave(sccs_weave::Error::ChecksumMismatch { stored, computed })) =
                HistoryCodec::verify_checksum(name.s_file()).map_err(Error::from)
            {
                findings.push(ValFinding::ChecksumMismatch { stored, computed });
            }
        }
        let _ = stored_checksum;

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::Admin;
    use crate::capabilities::EnvUserInfo;
    use crate::config::EngineConfig;
    use sccs_weave::{Date, Flags};

    fn now() -> Date {
        Date::parse("24/01/01 00:00:00").unwrap()
    }

    fn setup(dir: &tempdir::TempDir) -> HistoryName {
        let name = HistoryName::new(dir.path(), "x");
        let cfg = EngineConfig::new("sccs");
        Admin::new(&cfg)
            .create(&name, b"hello\nworld\n", Flags::new(), vec![], vec![], &EnvUserInfo, now())
            .unwrap();
        name
    }

    #[test]
    fn prt_lists_every_delta() {
        let dir = tempdir::TempDir::new("sccs-report").unwrap();
        let name = setup(&dir);
        let text = Prt::run(&name).unwrap();
        assert!(text.contains("1.1"));
    }

    #[test]
    fn rmdel_marks_leaf_as_removed() {
        let dir = tempdir::TempDir::new("sccs-report").unwrap();
        let name = setup(&dir);
        Rmdel::run(&name, Sid::root()).unwrap();

        let (header, _cksum, _cursor) = HistoryCodec::read(name.s_file()).unwrap();
        let delta = header.delta_table.iter().find(|d| d.sid == Sid::root()).unwrap();
        assert!(delta.is_removed());
    }

    #[test]
    fn rmdel_rejects_non_leaf() {
        let dir = tempdir::TempDir::new("sccs-report").unwrap();
        let name = setup(&dir);

        // Fabricate a second delta so the root is no longer a leaf.
        let (mut header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();
        let mut body = Vec::new();
        while let Some(l) = cursor.next_line().unwrap() {
            body.push(l);
        }
        let mut child = header.delta_table.iter().next().unwrap().clone();
        child.sid = Sid::trunk(1, 2);
        child.seq = 2;
        child.prev_seq = 1;
        header.delta_table.prepend(child);
        HistoryCodec::write(name.s_file(), name.x_file(), &header, body).unwrap();

        assert!(matches!(Rmdel::run(&name, Sid::root()), Err(Error::NotALeaf(1))));
    }

    #[test]
    fn cdc_replaces_mrs_and_comments() {
        let dir = tempdir::TempDir::new("sccs-report").unwrap();
        let name = setup(&dir);
        Cdc::run(&name, Sid::root(), vec!["MR-42".to_string()], vec!["updated comment".to_string()]).unwrap();

        let (header, _cksum, _cursor) = HistoryCodec::read(name.s_file()).unwrap();
        let delta = header.delta_table.iter().find(|d| d.sid == Sid::root()).unwrap();
        assert_eq!(delta.mrs, vec!["MR-42".to_string()]);
        assert_eq!(delta.comments, vec!["updated comment".to_string()]);
    }

    #[test]
    fn val_reports_no_findings_on_a_fresh_file() {
        let dir = tempdir::TempDir::new("sccs-report").unwrap();
        let name = setup(&dir);
        assert!(Val::run(&name, true).unwrap().is_empty());
    }

    #[test]
    fn val_detects_dangling_prev_seq() {
        let dir = tempdir::TempDir::new("sccs-report").unwrap();
        let name = setup(&dir);

        let (mut header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();
        let mut body = Vec::new();
        while let Some(l) = cursor.next_line().unwrap() {
            body.push(l);
        }
        let mut dangling = header.delta_table.iter().next().unwrap().clone();
        dangling.sid = Sid::trunk(1, 2);
        dangling.seq = 2;
        dangling.prev_seq = 99;
        header.delta_table.prepend(dangling);
        HistoryCodec::write(name.s_file(), name.x_file(), &header, body).unwrap();

        let findings = Val::run(&name, false).unwrap();
        assert!(findings.contains(&ValFinding::DanglingPrevSeq { seq: 2, prev_seq: 99 }));
    }
}
