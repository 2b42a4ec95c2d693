//! `DeltaRecord` (delta): diff the checked-out working copy against its baseline and splice a
//! new delta into the weave (§4.5).
//!
//! This is the one operation that writes a *changed* body, as opposed to `Admin`, which only
//! ever rewrites metadata. The new body is produced by replaying the old body through a
//! [`WeaveReader`] configured for the checkout's baseline and consulting a classical `ed`-style
//! diff script (`LineDiff`) to decide, line by line, whether to copy a baseline line through
//! unchanged, wrap it in a new `^AD`/`^AE` delete region, or splice in a new `^AI`/`^AE` insert
//! region.

use std::fs;
use std::path::PathBuf;

use sccs_naming::{FileLock, HistoryName};
use sccs_weave::{
    BodyLine, Ctrl, Date, Delta, DeltaKind, Header, HistoryCodec, SeqNo, SeqSet, SeqState, Sid,
    WeaveReader,
};

use crate::binary::uuencode;
use crate::capabilities::{EdHunk, EdOp, LineDiff, MrValidator, UserInfo};
use crate::config::EngineConfig;
use crate::errors::{Error, Result};
use crate::extract::resolve_seqs;
use crate::pfile::{PEntry, PFile};

#[derive(Clone, Debug, Default)]
pub struct DeltaOptions {
    pub mrs: Vec<String>,
    pub comments: Vec<String>,
}

/// Result of a successful `DeltaRecord::apply`.
#[derive(Clone, Debug)]
pub struct DeltaSummary {
    pub sid: Sid,
    pub inserted: u32,
    pub deleted: u32,
    pub unchanged: u32,
    /// Set when the history file was successfully rewritten but a step after the atomic
    /// rename (removing the p-file entry) failed; the caller should surface this without
    /// treating the whole operation as failed (§4.5, "Error handling").
    pub pfile_warning: Option<String>,
}

/// Splices a new delta into a history file's weave. Construction takes the process-global
/// [`EngineConfig`] once, matching `Admin`/`Extract` (§2a/§9).
pub struct DeltaRecord<'c> {
    config: &'c EngineConfig,
}

impl<'c> DeltaRecord<'c> {
    pub fn new(config: &'c EngineConfig) -> DeltaRecord<'c> {
        DeltaRecord { config }
    }

    /// Apply the diff between `name`'s g-file and the delta it was checked out from, recording
    /// a new delta. `claimed_got` identifies which outstanding p-file entry this call is
    /// resolving (§4.5 step 1).
    pub fn apply(
        &self,
        name: &HistoryName,
        claimed_got: Sid,
        opts: DeltaOptions,
        diff: &dyn LineDiff,
        user_info: &dyn UserInfo,
        mr_validator: &dyn MrValidator,
        now: Date,
    ) -> Result<DeltaSummary> {
        let lock = FileLock::acquire(name)?;

        let mut pfile = PFile::load(name.p_file())?;
        let entry = pfile.find_by_got(claimed_got).cloned().ok_or(Error::NoSuchCheckout)?;

        let (header, _checksum, cursor) = HistoryCodec::read(name.s_file())?;
        let table = &header.delta_table;

        let baseline = table.by_sid(entry.got).ok_or(Error::SidNotFound)?;
        let baseline_seq = baseline.seq;
        let include = resolve_seqs(table, &entry.include)?;
        let exclude = resolve_seqs(table, &entry.exclude)?;

        check_authorized(&header, user_info)?;
        check_release_admissible(&header, entry.assigned.release)?;
        if header.flags.mr_validator.is_some() && opts.mrs.is_empty() {
            return Err(Error::MrRequired);
        }

        let state = SeqState::for_target(table, baseline_seq, &include, &exclude, false)?;
        let (baseline_lines, _stats) = WeaveReader::new(cursor, &state).extract_lines()?;

        if let Some(program) = &header.flags.mr_validator {
            mr_validator.validate(program, &opts.mrs)?;
        }

        let scratch = TempFiles::new(name);
        fs::write(scratch.d_file(), join_lines(&baseline_lines))?;

        let working_raw = fs::read(name.g_file())?;
        if header.flags.id_keyword_required {
            let text = String::from_utf8_lossy(&working_raw);
            if !crate::keyword::contains_recognised_keyword(&text) {
                return Err(Error::NoIdKeywords);
            }
        }
        let diff_target = if header.flags.encoded {
            fs::write(scratch.u_file(), join_lines(&uuencode(&working_raw)))?;
            scratch.u_file()
        } else {
            name.g_file()
        };

        let hunks = diff.diff(&scratch.d_file(), &diff_target)?;
        drop(scratch);

        // Re-open a fresh cursor over the same (unmodified) file for the splice walk; the
        // first cursor was already consumed reconstructing the baseline text above.
        let (header2, _checksum2, cursor2) = HistoryCodec::read(name.s_file())?;
        let table2 = &header2.delta_table;
        let state2 = SeqState::for_target(table2, baseline_seq, &include, &exclude, false)?;

        let mut null_deltas = Vec::new();
        let mut next_seq = table2.max_seq() + 1;
        if header2.flags.null_deltas {
            for release in (baseline.sid.release + 1)..entry.assigned.release {
                null_deltas.push(Delta {
                    kind: DeltaKind::Delta,
                    sid: Sid::trunk(release, 1),
                    date: now,
                    user: user_info.current_user(),
                    seq: next_seq,
                    prev_seq: null_deltas.last().map(|d: &Delta| d.seq).unwrap_or(baseline_seq),
                    inserted: 0,
                    deleted: 0,
                    unchanged: 0,
                    included: SeqSet::absent(),
                    excluded: SeqSet::absent(),
                    ignored: SeqSet::absent(),
                    mrs: opts.mrs.clone(),
                    comments: vec!["null delta".to_string()],
                });
                next_seq += 1;
            }
        }
        let new_seq = next_seq;
        let new_prev_seq = null_deltas.last().map(|d| d.seq).unwrap_or(baseline_seq);

        let (new_body, counts) = splice_body(cursor2, &state2, &hunks, new_seq)?;

        let new_delta = Delta {
            kind: DeltaKind::Delta,
            sid: entry.assigned,
            date: now,
            user: user_info.current_user(),
            seq: new_seq,
            prev_seq: new_prev_seq,
            inserted: counts.inserted,
            deleted: counts.deleted,
            unchanged: counts.unchanged,
            included: seq_set_from(&include),
            excluded: seq_set_from(&exclude),
            ignored: SeqSet::absent(),
            mrs: opts.mrs,
            comments: opts.comments,
        };

        let mut new_table = table2.clone();
        for null_delta in null_deltas {
            new_table.prepend(null_delta);
        }
        new_table.prepend(new_delta.clone());

        let new_header = Header {
            delta_table: new_table,
            users: header2.users,
            flags: header2.flags,
            comments: header2.comments,
        };

        HistoryCodec::write(name.s_file(), name.x_file(), &new_header, new_body)?;
        log::info!("recorded delta {} in {:?}", new_delta.sid, name.s_file());

        let pfile_warning = match pfile.remove_by_assigned(entry.assigned).and_then(|_| pfile.save(name.p_file())) {
            Ok(()) => None,
            Err(e) => {
                log::warn!("history file for {:?} updated, but p-file cleanup failed: {}", name.s_file(), e);
                Some(e.to_string())
            }
        };

        lock.release()?;

        Ok(DeltaSummary {
            sid: new_delta.sid,
            inserted: new_delta.inserted,
            deleted: new_delta.deleted,
            unchanged: new_delta.unchanged,
            pfile_warning,
        })
    }
}

/// §3.3's users list: empty means "all"; otherwise the current user (by name, or by numeric
/// group id recorded as a plain string) must appear in it (§7's `NoAuthorisation` category).
fn check_authorized(header: &Header, user_info: &dyn UserInfo) -> Result<()> {
    if header.users.is_empty() {
        return Ok(());
    }
    let current = user_info.current_user();
    if header.users.iter().any(|u| u == &current) {
        Ok(())
    } else {
        Err(Error::NoAuthorisation(format!("user {:?} is not on this file's user list", current)))
    }
}

/// The `c`/`f`/`l` flags (§6.1): a new delta's release must not exceed the ceiling, must not
/// fall below the floor, and must not land on a locked release.
fn check_release_admissible(header: &Header, release: u32) -> Result<()> {
    if let Some(ceiling) = header.flags.ceiling {
        if release > ceiling {
            return Err(Error::AboveCeiling(release));
        }
    }
    if let Some(floor) = header.flags.floor {
        if release < floor {
            return Err(Error::BelowFloor(release));
        }
    }
    match &header.flags.locked {
        Some(sccs_weave::LockedReleases::All) => return Err(Error::ReleaseLocked(release)),
        Some(sccs_weave::LockedReleases::Releases(rels)) if rels.contains(&release) => {
            return Err(Error::ReleaseLocked(release));
        }
        _ => (),
    }
    Ok(())
}

fn seq_set_from(seqs: &[SeqNo]) -> SeqSet {
    if seqs.is_empty() {
        SeqSet::absent()
    } else {
        SeqSet::of(seqs.to_vec())
    }
}

fn join_lines(lines: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for line in lines {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out
}

/// Scratch `d.`/`u.` files used only for the duration of one `diff` invocation (§4.5 step 2-4,
/// §6.2). Removed on every exit path, including an early `?`/`return Err` between creation and
/// the `diff` call, via `Drop` — the same guarantee `sccs_naming::FileLock` gives its lock file.
struct TempFiles {
    d_file: PathBuf,
    u_file: PathBuf,
}

impl TempFiles {
    fn new(name: &HistoryName) -> TempFiles {
        TempFiles { d_file: name.d_file(), u_file: name.u_file() }
    }

    fn d_file(&self) -> PathBuf {
        self.d_file.clone()
    }

    fn u_file(&self) -> PathBuf {
        self.u_file.clone()
    }
}

impl Drop for TempFiles {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.d_file);
        let _ = fs::remove_file(&self.u_file);
    }
}

#[derive(Default)]
struct SpliceCounts {
    inserted: u32,
    deleted: u32,
    unchanged: u32,
}

/// Replay the old body through `state` (the baseline's `SeqState`), consulting `hunks` (ordered
/// by old-file line number, per `diff`'s own output order) to decide what to emit for the new
/// delta `new_seq` (§4.5 step 7).
fn splice_body<R: std::io::BufRead>(
    cursor: sccs_weave::BodyCursor<R>,
    state: &SeqState,
    hunks: &[EdHunk],
    new_seq: SeqNo,
) -> Result<(Vec<BodyLine>, SpliceCounts)> {
    let mut reader = WeaveReader::new(cursor, state);
    let mut out = Vec::new();
    let mut counts = SpliceCounts::default();
    let mut baseline_line_no: u32 = 0;
    let mut hunk_idx = 0;

    emit_inserts_at(&mut out, hunks, &mut hunk_idx, 0, new_seq, &mut counts);

    while let Some(event) = reader.next_event()? {
        match event {
            sccs_weave::WeaveEvent::Marker(ctrl, seq) => out.push(BodyLine::Control(ctrl, seq)),
            sccs_weave::WeaveEvent::Suppressed { data } => out.push(BodyLine::Data(data)),
            sccs_weave::WeaveEvent::Emit { data, .. } => {
                baseline_line_no += 1;

                match active_hunk(hunks, hunk_idx, baseline_line_no) {
                    Some(hunk) => {
                        out.push(BodyLine::Control(Ctrl::Delete, new_seq));
                        out.push(BodyLine::Data(data));
                        out.push(BodyLine::Control(Ctrl::End, new_seq));
                        counts.deleted += 1;

                        if hunk.right == baseline_line_no {
                            if hunk.op == EdOp::Change {
                                emit_insert_block(&mut out, &hunk.added_lines, new_seq, &mut counts);
                            }
                            hunk_idx += 1;
                        }
                    }
                    None => {
                        out.push(BodyLine::Data(data));
                        counts.unchanged += 1;
                    }
                }

                emit_inserts_at(&mut out, hunks, &mut hunk_idx, baseline_line_no, new_seq, &mut counts);
            }
        }
    }

    Ok((out, counts))
}

/// The delete/change hunk covering `line`, if `hunks[idx]` is one and `line` falls in its
/// `left..=right` range. Add hunks never "cover" a line; they're handled by
/// [`emit_inserts_at`].
fn active_hunk<'h>(hunks: &'h [EdHunk], idx: usize, line: u32) -> Option<&'h EdHunk> {
    let hunk = hunks.get(idx)?;
    if hunk.op == EdOp::Add {
        return None;
    }
    if line >= hunk.left && line <= hunk.right {
        Some(hunk)
    } else {
        None
    }
}

/// Emit every `Add` hunk (and a pending `Add`-only tail) positioned immediately after baseline
/// line `after_line`, advancing `idx` past each one consumed.
fn emit_inserts_at(
    out: &mut Vec<BodyLine>,
    hunks: &[EdHunk],
    idx: &mut usize,
    after_line: u32,
    new_seq: SeqNo,
    counts: &mut SpliceCounts,
) {
    while let Some(hunk) = hunks.get(*idx) {
        if hunk.op == EdOp::Add && hunk.left == after_line {
            emit_insert_block(out, &hunk.added_lines, new_seq, counts);
            *idx += 1;
        } else {
            break;
        }
    }
}

fn emit_insert_block(out: &mut Vec<BodyLine>, lines: &[Vec<u8>], new_seq: SeqNo, counts: &mut SpliceCounts) {
    if lines.is_empty() {
        return;
    }
    out.push(BodyLine::Control(Ctrl::Insert, new_seq));
    for line in lines {
        out.push(BodyLine::Data(line.clone()));
    }
    out.push(BodyLine::Control(Ctrl::End, new_seq));
    counts.inserted += lines.len() as u32;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::Admin;
    use crate::capabilities::{EnvUserInfo, NoMrValidator};
    use crate::extract::{Extract, ExtractOptions, ExtractedBody};
    use sccs_weave::Flags;

    struct FakeDiff(Vec<EdHunk>);

    impl LineDiff for FakeDiff {
        fn diff(&self, _old: &std::path::Path, _new: &std::path::Path) -> Result<Vec<EdHunk>> {
            Ok(self.0.clone())
        }
    }

    fn now() -> Date {
        Date::parse("24/01/02 00:00:00").unwrap()
    }

    fn checkout_for_edit(dir: &tempdir::TempDir, cfg: &EngineConfig) -> HistoryName {
        checkout_for_edit_with(dir, cfg, Flags::new(), vec![])
    }

    fn checkout_for_edit_with(
        dir: &tempdir::TempDir,
        cfg: &EngineConfig,
        flags: Flags,
        users: Vec<String>,
    ) -> HistoryName {
        let name = HistoryName::new(dir.path(), "x");
        Admin::new(cfg)
            .create(
                &name,
                b"hello\nworld\n",
                flags,
                users,
                vec![],
                &EnvUserInfo,
                Date::parse("24/01/01 00:00:00").unwrap(),
            )
            .unwrap();

        let (header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();
        Extract::new(cfg)
            .run(&name, &header, cursor, &ExtractOptions { for_edit: true, ..Default::default() }, &EnvUserInfo, now())
            .unwrap();
        name
    }

    #[test]
    fn adds_a_line_and_rewrites_weave() {
        let dir = tempdir::TempDir::new("sccs-delta").unwrap();
        let cfg = EngineConfig::new("sccs");
        let name = checkout_for_edit(&dir, &cfg);

        fs::write(name.g_file(), b"hello\nthere\nworld\n").unwrap();
        // "1a2,2" in classical ed notation: insert one new line after old line 1.
        let diff = FakeDiff(vec![EdHunk {
            left: 1,
            right: 1,
            op: EdOp::Add,
            added_lines: vec![b"there".to_vec()],
        }]);

        let summary = DeltaRecord::new(&cfg)
            .apply(&name, Sid::root(), DeltaOptions::default(), &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap();

        assert_eq!(summary.sid, Sid::trunk(1, 2));
        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.unchanged, 2);
        assert!(summary.pfile_warning.is_none());
        assert!(!name.p_file().exists());

        let (header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();
        let result = Extract::new(&cfg)
            .run(&name, &header, cursor, &ExtractOptions { keywords: false, ..Default::default() }, &EnvUserInfo, now())
            .unwrap();
        match result.body {
            ExtractedBody::Text(lines) => {
                assert_eq!(lines, vec!["hello".to_string(), "there".to_string(), "world".to_string()])
            }
            ExtractedBody::Binary(_) => panic!("expected text body"),
        }

        // The prior revision must still reconstruct unchanged.
        let (header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();
        let old = Extract::new(&cfg)
            .run(
                &name,
                &header,
                cursor,
                &ExtractOptions { requested_sid: Some(Sid::root().partial_sid()), ..Default::default() },
                &EnvUserInfo,
                now(),
            )
            .unwrap();
        match old.body {
            ExtractedBody::Text(lines) => {
                assert_eq!(lines, vec!["hello".to_string(), "world".to_string()])
            }
            ExtractedBody::Binary(_) => panic!("expected text body"),
        }
    }

    #[test]
    fn replaces_a_line() {
        let dir = tempdir::TempDir::new("sccs-delta").unwrap();
        let cfg = EngineConfig::new("sccs");
        let name = checkout_for_edit(&dir, &cfg);

        fs::write(name.g_file(), b"HI\nworld\n").unwrap();
        // "1c1" in classical ed notation: old line 1 changes to the new line.
        let diff =
            FakeDiff(vec![EdHunk { left: 1, right: 1, op: EdOp::Change, added_lines: vec![b"HI".to_vec()] }]);

        let summary = DeltaRecord::new(&cfg)
            .apply(&name, Sid::root(), DeltaOptions::default(), &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap();

        assert_eq!(summary.inserted, 1);
        assert_eq!(summary.deleted, 1);
        assert_eq!(summary.unchanged, 1);

        let (header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();
        let result = Extract::new(&cfg)
            .run(&name, &header, cursor, &ExtractOptions::default(), &EnvUserInfo, now())
            .unwrap();
        match result.body {
            ExtractedBody::Text(lines) => assert_eq!(lines, vec!["HI".to_string(), "world".to_string()]),
            ExtractedBody::Binary(_) => panic!("expected text body"),
        }
    }

    #[test]
    fn no_diff_hunks_is_pure_unchanged_round_trip() {
        let dir = tempdir::TempDir::new("sccs-delta").unwrap();
        let cfg = EngineConfig::new("sccs");
        let name = checkout_for_edit(&dir, &cfg);

        fs::write(name.g_file(), b"hello\nworld\n").unwrap();
        let diff = FakeDiff(vec![]);

        let summary = DeltaRecord::new(&cfg)
            .apply(&name, Sid::root(), DeltaOptions::default(), &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap();

        assert_eq!(summary.inserted, 0);
        assert_eq!(summary.deleted, 0);
        assert_eq!(summary.unchanged, 2);
    }

    #[test]
    fn rejects_claim_with_no_matching_checkout() {
        let dir = tempdir::TempDir::new("sccs-delta").unwrap();
        let cfg = EngineConfig::new("sccs");
        let name = checkout_for_edit(&dir, &cfg);
        fs::write(name.g_file(), b"hello\nworld\n").unwrap();
        let diff = FakeDiff(vec![]);

        let err = DeltaRecord::new(&cfg)
            .apply(&name, Sid::trunk(9, 9), DeltaOptions::default(), &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchCheckout));
    }

    #[test]
    fn mr_required_when_v_flag_set_without_mrs() {
        let dir = tempdir::TempDir::new("sccs-delta").unwrap();
        let cfg = EngineConfig::new("sccs");
        let mut flags = Flags::new();
        flags.mr_validator = Some(String::new());
        let name = checkout_for_edit_with(&dir, &cfg, flags, vec![]);

        fs::write(name.g_file(), b"hello\nworld\nthere\n").unwrap();
        let diff = FakeDiff(vec![EdHunk { left: 2, right: 2, op: EdOp::Add, added_lines: vec![b"there".to_vec()] }]);

        let err = DeltaRecord::new(&cfg)
            .apply(&name, Sid::root(), DeltaOptions::default(), &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap_err();
        assert!(matches!(err, Error::MrRequired));

        // Supplying an MR lets the same delta through.
        let opts = DeltaOptions { mrs: vec!["MR-1".to_string()], comments: vec![] };
        DeltaRecord::new(&cfg)
            .apply(&name, Sid::root(), opts, &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap();
    }

    #[test]
    fn no_id_keywords_rejected_when_i_flag_set() {
        let dir = tempdir::TempDir::new("sccs-delta").unwrap();
        let cfg = EngineConfig::new("sccs");
        let mut flags = Flags::new();
        flags.id_keyword_required = true;
        let name = checkout_for_edit_with(&dir, &cfg, flags, vec![]);

        fs::write(name.g_file(), b"hello\nthere\nworld\n").unwrap();
        let diff = FakeDiff(vec![EdHunk { left: 1, right: 1, op: EdOp::Add, added_lines: vec![b"there".to_vec()] }]);

        let err = DeltaRecord::new(&cfg)
            .apply(&name, Sid::root(), DeltaOptions::default(), &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap_err();
        assert!(matches!(err, Error::NoIdKeywords));
        assert!(!name.d_file().exists(), "d. scratch file must not survive a failed apply");
        assert!(!name.u_file().exists(), "u. scratch file must not survive a failed apply");

        fs::write(name.g_file(), b"hello\n%I%\nworld\n").unwrap();
        let diff = FakeDiff(vec![EdHunk { left: 1, right: 1, op: EdOp::Add, added_lines: vec![b"%I%".to_vec()] }]);
        DeltaRecord::new(&cfg)
            .apply(&name, Sid::root(), DeltaOptions::default(), &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap();
    }

    #[test]
    fn locked_release_rejects_delta() {
        let dir = tempdir::TempDir::new("sccs-delta").unwrap();
        let cfg = EngineConfig::new("sccs");
        let mut flags = Flags::new();
        flags.locked = Some(sccs_weave::LockedReleases::All);
        let name = checkout_for_edit_with(&dir, &cfg, flags, vec![]);

        fs::write(name.g_file(), b"hello\nthere\nworld\n").unwrap();
        let diff = FakeDiff(vec![EdHunk { left: 1, right: 1, op: EdOp::Add, added_lines: vec![b"there".to_vec()] }]);

        let err = DeltaRecord::new(&cfg)
            .apply(&name, Sid::root(), DeltaOptions::default(), &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap_err();
        assert!(matches!(err, Error::ReleaseLocked(1)));
    }

    #[test]
    fn user_not_on_list_is_rejected() {
        let dir = tempdir::TempDir::new("sccs-delta").unwrap();
        let cfg = EngineConfig::new("sccs");
        let name = checkout_for_edit_with(&dir, &cfg, Flags::new(), vec!["someone-else".to_string()]);

        fs::write(name.g_file(), b"hello\nworld\n").unwrap();
        let diff = FakeDiff(vec![]);

        let err = DeltaRecord::new(&cfg)
            .apply(&name, Sid::root(), DeltaOptions::default(), &diff, &EnvUserInfo, &NoMrValidator, now())
            .unwrap_err();
        assert!(matches!(err, Error::NoAuthorisation(_)));
    }
}
