//! `Extract` (get): produce a working copy for a requested revision, with optional keyword
//! expansion and optional `for_edit` checkout bookkeeping (§4.4).

use sccs_naming::HistoryName;
use sccs_weave::{
    BodyCursor, Date, DeltaTable, Header, PartialSid, SeqNo, SeqState, Sid, SidRange, WeaveEvent,
    WeaveReader,
};

use crate::binary::uudecode;
use crate::capabilities::UserInfo;
use crate::config::EngineConfig;
use crate::errors::{Error, Result};
use crate::keyword::{KeywordContext, KeywordSubst};
use crate::pfile::{PEntry, PFile};

#[derive(Clone, Debug, Default)]
pub struct ExtractOptions {
    /// `None` means "use the file's default"; see §4.4's resolution order.
    pub requested_sid: Option<PartialSid>,
    pub cutoff_date: Option<Date>,
    pub include: Vec<SidRange>,
    pub exclude: Vec<SidRange>,
    /// Expand `%X%` keywords in the extracted text.
    pub keywords: bool,
    /// Show ignored ancestors' lines (`-a`).
    pub show_ignored: bool,
    /// Check out for editing: compute the next assignable Sid, record a p-file entry, and
    /// force keyword suppression regardless of `keywords`.
    pub for_edit: bool,
    /// Force a branch off of the resolved Sid.
    pub branch: bool,
    pub wstring: Option<String>,
    /// Collect a `Sid\t` per-line authorship summary alongside the text.
    pub with_summary: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExtractedBody {
    Text(Vec<String>),
    /// The body carried the `e` (encoded) flag; lines have already been uudecoded back to the
    /// original bytes exactly (scenario 5, §8).
    Binary(Vec<u8>),
}

#[derive(Clone, Debug)]
pub struct ExtractResult {
    pub sid: Sid,
    /// The Sid this revision will become if checked out for edit and later delta'd.
    pub assigned: Option<Sid>,
    pub line_count: usize,
    /// Every Sid whose include/exclude state was effectively applied while reconstructing this
    /// revision.
    pub applied: Vec<Sid>,
    pub body: ExtractedBody,
    pub summary: Option<Vec<(Sid, String)>>,
    /// The `x` flag (§6.1): the caller writing this body out to a g-file should mark it
    /// executable. This crate never writes the g-file itself, so the bit is surfaced here
    /// rather than acted on.
    pub executable: bool,
}

pub struct Extract<'c> {
    config: &'c EngineConfig,
}

impl<'c> Extract<'c> {
    pub fn new(config: &'c EngineConfig) -> Extract<'c> {
        Extract { config }
    }

    pub fn run(
        &self,
        name: &HistoryName,
        header: &Header,
        cursor: BodyCursor<std::io::BufReader<std::fs::File>>,
        opts: &ExtractOptions,
        user_info: &dyn UserInfo,
        now: Date,
    ) -> Result<ExtractResult> {
        let table = &header.delta_table;
        let requested = opts.requested_sid.or_else(|| default_sid(header));
        let target_seq = resolve_target(table, requested, opts.cutoff_date)?;
        let target = table.by_seq(target_seq).expect("resolved seq must exist in table");

        let extra_include = resolve_seqs(table, &opts.include)?;
        let extra_exclude = resolve_seqs(table, &opts.exclude)?;
        let state =
            SeqState::for_target(table, target_seq, &extra_include, &extra_exclude, opts.show_ignored)?;

        let mut reader = WeaveReader::new(cursor, &state);
        let mut raw_lines = Vec::new();
        let mut authors = Vec::new();
        while let Some(event) = reader.next_event()? {
            if let WeaveEvent::Emit { author, data } = event {
                authors.push(author);
                raw_lines.push(data);
            }
        }

        let applied = state
            .applied_sequences()
            .into_iter()
            .filter_map(|seq| table.by_seq(seq).map(|d| d.sid))
            .collect();

        let assigned = if opts.for_edit {
            Some(next_sid_for_edit(table, target_seq, target.sid, opts.branch, header.flags.branching)?)
        } else {
            None
        };

        if opts.for_edit {
            self.record_checkout(
                name,
                target.sid,
                assigned.expect("set above"),
                opts,
                user_info,
                header.flags.joint_edit,
            )?;
        }

        let body = if header.flags.encoded {
            ExtractedBody::Binary(uudecode(&raw_lines))
        } else {
            let suppress_keywords = opts.for_edit || !opts.keywords;
            let ctx = KeywordContext {
                module: header.flags.module.clone(),
                sid: target.sid,
                delta_date: target.date,
                now,
                file_type: header.flags.file_type.clone(),
                user_def: header.flags.user_def.clone(),
                s_file: name.s_file(),
                allowed_letters: header.flags.subst_letters.clone(),
                wstring_override: opts.wstring.clone(),
            };
            let mut texts = Vec::with_capacity(raw_lines.len());
            for (i, raw) in raw_lines.iter().enumerate() {
                let text = String::from_utf8_lossy(raw);
                let (expanded, _found) =
                    KeywordSubst::expand_line(&ctx, &text, (i + 1) as u32, suppress_keywords);
                texts.push(expanded);
            }
            ExtractedBody::Text(texts)
        };

        let line_count = match &body {
            ExtractedBody::Text(lines) => lines.len(),
            ExtractedBody::Binary(_) => raw_lines.len(),
        };

        let summary = if opts.with_summary {
            Some(
                authors
                    .iter()
                    .zip(raw_lines.iter())
                    .map(|(&seq, data)| {
                        let sid = table.by_seq(seq).map(|d| d.sid).unwrap_or_else(Sid::root);
                        (sid, String::from_utf8_lossy(data).into_owned())
                    })
                    .collect(),
            )
        } else {
            None
        };

        Ok(ExtractResult {
            sid: target.sid,
            assigned,
            line_count,
            applied,
            body,
            summary,
            executable: header.flags.executable,
        })
    }

    /// Record a new p-file entry. Without the `j` flag (§6.1), a revision already checked out
    /// for edit by anyone may not be checked out again until that edit is delivered or ungotten
    /// (classical "joint edit" restriction).
    fn record_checkout(
        &self,
        name: &HistoryName,
        got: Sid,
        assigned: Sid,
        opts: &ExtractOptions,
        user_info: &dyn UserInfo,
        joint_edit: bool,
    ) -> Result<()> {
        let mut pfile = PFile::load(name.p_file())?;
        if !joint_edit && pfile.find_by_got(got).is_some() {
            return Err(Error::AlreadyBeingEdited(got));
        }
        pfile.add_entry(PEntry {
            got,
            assigned,
            user: user_info.current_user(),
            include: opts.include.clone(),
            exclude: opts.exclude.clone(),
        })?;
        pfile.save(name.p_file())?;
        log::info!("checked out {} as {} in {:?}", got, assigned, name.p_file());
        Ok(())
    }
}

/// Resolve a list of Sid ranges (as recorded in the p-file's `-i`/`-x` lists) against a delta
/// table to the sequence numbers they name. Shared with [`crate::delta::DeltaRecord`], which
/// needs the same resolution when carrying a checkout's include/exclude lists onto a new delta.
pub(crate) fn resolve_seqs(table: &DeltaTable, ranges: &[SidRange]) -> Result<Vec<SeqNo>> {
    let mut out = Vec::new();
    for range in ranges {
        for delta in table.iter() {
            if range.contains(delta.sid) {
                out.push(delta.seq);
            }
        }
    }
    Ok(out)
}

/// The `d` flag's stored Sid (§6.1), parsed on demand rather than at header-read time since
/// not every caller of `Header` needs it. A value that fails to parse is treated as absent,
/// the same leniency `Flags::apply_line` already extends to other free-form flag arguments.
fn default_sid(header: &Header) -> Option<PartialSid> {
    header.flags.default_sid.as_deref().and_then(|s| s.parse().ok())
}

/// Resolution order from §4.4: requested Sid, else the `d` flag's default, else the newest
/// trunk leaf; release-only -> highest leaf in that release honouring `cutoff_date`, full ->
/// exact match.
fn resolve_target(
    table: &DeltaTable,
    requested: Option<PartialSid>,
    cutoff: Option<Date>,
) -> Result<SeqNo> {
    match requested {
        Some(PartialSid::Full(sid)) => table.by_sid(sid).map(|d| d.seq).ok_or(Error::SidNotFound),
        Some(partial) => resolve_partial(table, partial, cutoff),
        None => highest_trunk(table, cutoff),
    }
}

fn resolve_partial(table: &DeltaTable, partial: PartialSid, cutoff: Option<Date>) -> Result<SeqNo> {
    match partial {
        PartialSid::Full(sid) => table.by_sid(sid).map(|d| d.seq).ok_or(Error::SidNotFound),
        PartialSid::ReleaseLevel(r, l) => {
            table.by_sid(Sid::trunk(r, l)).map(|d| d.seq).ok_or(Error::SidNotFound)
        }
        PartialSid::Release(r) => table
            .iter()
            .filter(|d| d.sid.release == r && !d.is_removed())
            .filter(|d| cutoff.map_or(true, |c| d.date <= c))
            .max_by_key(|d| d.sid)
            .map(|d| d.seq)
            .ok_or(Error::SidNotFound),
    }
}

fn highest_trunk(table: &DeltaTable, cutoff: Option<Date>) -> Result<SeqNo> {
    table
        .iter()
        .filter(|d| d.sid.is_trunk() && !d.is_removed())
        .filter(|d| cutoff.map_or(true, |c| d.date <= c))
        .max_by_key(|d| d.sid)
        .map(|d| d.seq)
        .ok_or(Error::SidNotFound)
}

/// Next-Sid algorithm for `for_edit` (§4.4): branch off if the resolved Sid already has a
/// descendant or a branch was explicitly requested; otherwise advance trunk level (or branch
/// sequence, if the resolved Sid was itself on a branch). The `b` flag (§6.1) gates whether
/// branching is permitted at all; without it, a would-be branch is an error rather than a
/// silent fallback.
fn next_sid_for_edit(
    table: &DeltaTable,
    resolved_seq: SeqNo,
    resolved_sid: Sid,
    force_branch: bool,
    branching_allowed: bool,
) -> Result<Sid> {
    let needs_branch = force_branch || !table.is_leaf(resolved_seq);
    if needs_branch {
        if !branching_allowed {
            return Err(Error::BranchingNotAllowed);
        }
        Ok(if resolved_sid.is_trunk() {
            let existing = table.branches_at(resolved_sid.release, resolved_sid.level);
            resolved_sid.first_branch(&existing)
        } else {
            resolved_sid.next_in_branch()
        })
    } else if resolved_sid.is_trunk() {
        Ok(resolved_sid.next_trunk())
    } else {
        Ok(resolved_sid.next_in_branch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::Admin;
    use crate::capabilities::EnvUserInfo;
    use sccs_weave::{Flags, HistoryCodec};

    fn setup(dir: &tempdir::TempDir) -> HistoryName {
        let name = HistoryName::new(dir.path(), "x");
        let cfg = EngineConfig::new("sccs");
        let admin = Admin::new(&cfg);
        admin
            .create(
                &name,
                b"hello\nworld\n",
                Flags::new(),
                vec![],
                vec![],
                &EnvUserInfo,
                Date::parse("24/01/01 00:00:00").unwrap(),
            )
            .unwrap();
        name
    }

    #[test]
    fn extracts_default_revision() {
        let dir = tempdir::TempDir::new("sccs-extract").unwrap();
        let name = setup(&dir);
        let (header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();

        let cfg = EngineConfig::new("sccs");
        let extract = Extract::new(&cfg);
        let result = extract
            .run(
                &name,
                &header,
                cursor,
                &ExtractOptions { keywords: true, ..Default::default() },
                &EnvUserInfo,
                Date::parse("24/01/02 00:00:00").unwrap(),
            )
            .unwrap();

        assert_eq!(result.sid, Sid::root());
        assert_eq!(result.line_count, 2);
        match result.body {
            ExtractedBody::Text(lines) => assert_eq!(lines, vec!["hello".to_string(), "world".to_string()]),
            ExtractedBody::Binary(_) => panic!("expected text body"),
        }
    }

    #[test]
    fn for_edit_records_pfile_entry_and_assigns_next_sid() {
        let dir = tempdir::TempDir::new("sccs-extract").unwrap();
        let name = setup(&dir);
        let (header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();

        let cfg = EngineConfig::new("sccs");
        let extract = Extract::new(&cfg);
        let result = extract
            .run(
                &name,
                &header,
                cursor,
                &ExtractOptions { for_edit: true, ..Default::default() },
                &EnvUserInfo,
                Date::parse("24/01/02 00:00:00").unwrap(),
            )
            .unwrap();

        assert_eq!(result.assigned, Some(Sid::trunk(1, 2)));
        let pfile = PFile::load(name.p_file()).unwrap();
        assert_eq!(pfile.entries().len(), 1);
        assert_eq!(pfile.entries()[0].assigned, Sid::trunk(1, 2));

        // Keyword expansion is suppressed in for_edit mode even if raw text had a keyword.
        match result.body {
            ExtractedBody::Text(lines) => assert_eq!(lines, vec!["hello".to_string(), "world".to_string()]),
            ExtractedBody::Binary(_) => panic!("expected text body"),
        }
    }

    #[test]
    fn second_for_edit_checkout_rejected_without_joint_edit_flag() {
        let dir = tempdir::TempDir::new("sccs-extract").unwrap();
        let name = setup(&dir);
        let (header, _cksum, _cursor) = HistoryCodec::read(name.s_file()).unwrap();

        let cfg = EngineConfig::new("sccs");
        let extract = Extract::new(&cfg);
        let opts = ExtractOptions { for_edit: true, ..Default::default() };

        let (_, _, cursor1) = HistoryCodec::read(name.s_file()).unwrap();
        extract.run(&name, &header, cursor1, &opts, &EnvUserInfo, Date::parse("24/01/02 00:00:00").unwrap()).unwrap();

        let (_, _, cursor2) = HistoryCodec::read(name.s_file()).unwrap();
        let err = extract
            .run(&name, &header, cursor2, &opts, &EnvUserInfo, Date::parse("24/01/03 00:00:00").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyBeingEdited(sid) if sid == Sid::root()));
    }

    #[test]
    fn second_for_edit_checkout_allowed_with_joint_edit_flag() {
        let dir = tempdir::TempDir::new("sccs-extract").unwrap();
        let name = setup(&dir);
        let (mut header, _cksum, _cursor) = HistoryCodec::read(name.s_file()).unwrap();
        header.flags.joint_edit = true;

        let cfg = EngineConfig::new("sccs");
        let extract = Extract::new(&cfg);
        let opts = ExtractOptions { for_edit: true, ..Default::default() };

        let (_, _, cursor1) = HistoryCodec::read(name.s_file()).unwrap();
        extract.run(&name, &header, cursor1, &opts, &EnvUserInfo, Date::parse("24/01/02 00:00:00").unwrap()).unwrap();

        let (_, _, cursor2) = HistoryCodec::read(name.s_file()).unwrap();
        let result = extract
            .run(&name, &header, cursor2, &opts, &EnvUserInfo, Date::parse("24/01/03 00:00:00").unwrap())
            .unwrap();
        assert_eq!(result.assigned, Some(Sid::trunk(1, 2)));

        let pfile = PFile::load(name.p_file()).unwrap();
        assert_eq!(pfile.entries().len(), 2);
    }

    #[test]
    fn executable_flag_is_surfaced_on_the_result() {
        let dir = tempdir::TempDir::new("sccs-extract").unwrap();
        let name = HistoryName::new(dir.path(), "x");
        let cfg = EngineConfig::new("sccs");
        let admin = Admin::new(&cfg);
        let mut flags = Flags::new();
        flags.executable = true;
        admin
            .create(&name, b"hello\n", flags, vec![], vec![], &EnvUserInfo, Date::parse("24/01/01 00:00:00").unwrap())
            .unwrap();
        let (header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();

        let extract = Extract::new(&cfg);
        let result = extract
            .run(&name, &header, cursor, &ExtractOptions::default(), &EnvUserInfo, Date::parse("24/01/02 00:00:00").unwrap())
            .unwrap();
        assert!(result.executable);
    }

    #[test]
    fn branch_request_rejected_without_b_flag() {
        let dir = tempdir::TempDir::new("sccs-extract").unwrap();
        let name = setup(&dir);
        let (header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();

        let cfg = EngineConfig::new("sccs");
        let extract = Extract::new(&cfg);
        let err = extract
            .run(
                &name,
                &header,
                cursor,
                &ExtractOptions { for_edit: true, branch: true, ..Default::default() },
                &EnvUserInfo,
                Date::parse("24/01/02 00:00:00").unwrap(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::BranchingNotAllowed));
    }

    #[test]
    fn branch_request_allowed_with_b_flag() {
        let dir = tempdir::TempDir::new("sccs-extract").unwrap();
        let name = setup(&dir);
        let (mut header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();
        header.flags.branching = true;

        let cfg = EngineConfig::new("sccs");
        let extract = Extract::new(&cfg);
        let result = extract
            .run(
                &name,
                &header,
                cursor,
                &ExtractOptions { for_edit: true, branch: true, ..Default::default() },
                &EnvUserInfo,
                Date::parse("24/01/02 00:00:00").unwrap(),
            )
            .unwrap();
        assert_eq!(result.assigned, Some(Sid::branch(1, 1, 1, 1)));
    }

    #[test]
    fn d_flag_default_sid_used_when_none_requested() {
        use sccs_weave::{BodyLine, Ctrl, Delta, DeltaKind, SeqSet};

        let dir = tempdir::TempDir::new("sccs-extract").unwrap();
        let name = HistoryName::new(dir.path(), "x");

        let mk = |sid: Sid, seq: SeqNo, prev: SeqNo| Delta {
            kind: DeltaKind::Delta,
            sid,
            date: Date::parse("24/01/01 00:00:00").unwrap(),
            user: "tester".to_string(),
            seq,
            prev_seq: prev,
            inserted: if prev == 0 { 2 } else { 0 },
            deleted: 0,
            unchanged: if prev == 0 { 0 } else { 2 },
            included: SeqSet::absent(),
            excluded: SeqSet::absent(),
            ignored: SeqSet::absent(),
            mrs: Vec::new(),
            comments: vec!["test delta".to_string()],
        };
        let table =
            DeltaTable::from_deltas(vec![mk(Sid::trunk(1, 2), 2, 1), mk(Sid::trunk(1, 1), 1, 0)]);
        let body = vec![
            BodyLine::Control(Ctrl::Insert, 1),
            BodyLine::Data(b"hello".to_vec()),
            BodyLine::Data(b"world".to_vec()),
            BodyLine::Control(Ctrl::End, 1),
        ];
        let mut flags = Flags::new();
        flags.default_sid = Some("1.1".to_string());
        let header = Header { delta_table: table, users: vec![], flags, comments: vec![] };
        HistoryCodec::write(name.s_file(), &dir.path().join("x.x"), &header, body).unwrap();

        let (header, _cksum, cursor) = HistoryCodec::read(name.s_file()).unwrap();
        let cfg = EngineConfig::new("sccs");
        let extract = Extract::new(&cfg);
        let result = extract
            .run(&name, &header, cursor, &ExtractOptions::default(), &EnvUserInfo, Date::parse("24/01/02 00:00:00").unwrap())
            .unwrap();
        assert_eq!(result.sid, Sid::trunk(1, 1));
    }
}
