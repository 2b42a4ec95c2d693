//! `Admin::create`/`set_flag`/`clear_flag`/`set_users` (§4.8).

use sccs_naming::{FileLock, HistoryName};
use sccs_weave::{
    BodyLine, Ctrl, Date, Delta, DeltaKind, DeltaTable, Flags, Header, HistoryCodec, SeqSet, Sid,
};

use crate::binary::{split_text_lines, uuencode};
use crate::capabilities::UserInfo;
use crate::config::EngineConfig;
use crate::errors::{Error, Result};

/// Mutates file-level metadata: flags and the user list. Construction takes the process-global
/// [`EngineConfig`] once, per §2a/§9.
pub struct Admin<'c> {
    config: &'c EngineConfig,
}

impl<'c> Admin<'c> {
    pub fn new(config: &'c EngineConfig) -> Admin<'c> {
        Admin { config }
    }

    /// Build a brand-new history file from an initial text (or binary) body: assigns
    /// `Sid(1,1,0,0)`, `seq=1`, `prev_seq=0`, writes the supplied flags and users, and produces
    /// the single-revision weave. Falls back to the uuencode body representation per §4.6 if the
    /// raw content can't survive text insertion and binary creation is allowed.
    pub fn create(
        &self,
        name: &HistoryName,
        raw_body: &[u8],
        mut flags: Flags,
        users: Vec<String>,
        comments: Vec<String>,
        user_info: &dyn UserInfo,
        now: Date,
    ) -> Result<()> {
        let _lock = FileLock::acquire(name)?;

        let (body_lines, encoded) = match split_text_lines(raw_body, self.config.max_sfile_line_len) {
            Ok(lines) => (lines, false),
            Err(detail) => {
                if !self.config.binary_file_creation_allowed {
                    return Err(sccs_weave::Error::BodyIsBinary(detail).into());
                }
                log::warn!("falling back to uuencoded body: {}", detail);
                (uuencode(raw_body), true)
            }
        };
        flags.encoded = encoded;

        let delta = Delta {
            kind: DeltaKind::Delta,
            sid: Sid::root(),
            date: now,
            user: user_info.current_user(),
            seq: 1,
            prev_seq: 0,
            inserted: body_lines.len() as u32,
            deleted: 0,
            unchanged: 0,
            included: SeqSet::absent(),
            excluded: SeqSet::absent(),
            ignored: SeqSet::absent(),
            mrs: Vec::new(),
            comments: if comments.is_empty() {
                vec![format!("date and time created {} by {}", now, user_info.current_user())]
            } else {
                comments
            },
        };

        let header = Header {
            delta_table: DeltaTable::from_deltas(vec![delta]),
            users,
            flags,
            comments: Vec::new(),
        };

        let mut body = Vec::with_capacity(body_lines.len() + 2);
        body.push(BodyLine::Control(Ctrl::Insert, 1));
        body.extend(body_lines.into_iter().map(BodyLine::Data));
        body.push(BodyLine::Control(Ctrl::End, 1));

        HistoryCodec::write(name.s_file(), name.x_file(), &header, body)?;
        log::info!("created {:?}", name.s_file());
        Ok(())
    }

    /// Set `letter` to `value`, rewriting the whole file through [`HistoryCodec::write`] under
    /// the `z.` lock without touching the body. Applying the same mutation twice is byte-exact
    /// on the second application (the checksum is recomputed from identical metadata both
    /// times), satisfying the idempotent-admin property (§8).
    pub fn set_flag(&self, name: &HistoryName, letter: char, value: &str) -> Result<()> {
        self.rewrite_flags(name, |flags| flags.apply_line(letter, value).map_err(Error::from))
    }

    /// Clear a boolean or valued flag back to its unset default.
    pub fn clear_flag(&self, name: &HistoryName, letter: char) -> Result<()> {
        self.rewrite_flags(name, |flags| {
            *flags = clear_one(flags, letter);
            Ok(())
        })
    }

    pub fn set_users(&self, name: &HistoryName, users: Vec<String>) -> Result<()> {
        let _lock = FileLock::acquire(name)?;
        let (mut header, _checksum, cursor) = HistoryCodec::read(name.s_file())?;
        header.users = users;
        self.rewrite(name, header, cursor)
    }

    fn rewrite_flags(
        &self,
        name: &HistoryName,
        mutate: impl FnOnce(&mut Flags) -> Result<()>,
    ) -> Result<()> {
        let _lock = FileLock::acquire(name)?;
        let (mut header, _checksum, cursor) = HistoryCodec::read(name.s_file())?;
        mutate(&mut header.flags)?;
        self.rewrite(name, header, cursor)
    }

    fn rewrite(
        &self,
        name: &HistoryName,
        header: Header,
        mut cursor: sccs_weave::BodyCursor<std::io::BufReader<std::fs::File>>,
    ) -> Result<()> {
        let mut body = Vec::new();
        while let Some(line) = cursor.next_line()? {
            body.push(line);
        }
        HistoryCodec::write(name.s_file(), name.x_file(), &header, body)?;
        log::info!("rewrote metadata for {:?}", name.s_file());
        Ok(())
    }
}

fn clear_one(flags: &Flags, letter: char) -> Flags {
    let mut out = flags.clone();
    match letter {
        'b' => out.branching = false,
        'c' => out.ceiling = None,
        'f' => out.floor = None,
        'd' => out.default_sid = None,
        'i' => out.id_keyword_required = false,
        'j' => out.joint_edit = false,
        'l' => out.locked = None,
        'm' => out.module = None,
        'n' => out.null_deltas = false,
        'q' => out.user_def = None,
        'e' => out.encoded = false,
        't' => out.file_type = None,
        'v' => out.mr_validator = None,
        'x' => out.executable = false,
        'y' => out.subst_letters = None,
        _ => (),
    }
    out
}
