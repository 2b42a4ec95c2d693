//! Read/write of the on-disk history-file grammar (§4.1), including the checksum.
//!
//! Every metadata line begins with `SOH` (`0x01`). The codec reads the checksum header, the
//! delta table, the users list, the flags, and the description comments eagerly into a
//! [`Header`], then hands back a [`BodyCursor`] positioned at the first body line so that the
//! (potentially large) interleaved weave can be streamed rather than materialised.

use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::date::Date;
use crate::delta::{Delta, DeltaKind, DeltaTable, SeqSet};
use crate::errors::{Error, Result};
use crate::flags::Flags;
use crate::header::Header;
use crate::linebuf::LineBuf;
use crate::sid::{SeqNo, Sid};

const SOH: u8 = 0x01;

/// The three shapes a body control line may take (§6.3).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Ctrl {
    Insert,
    Delete,
    End,
}

impl Ctrl {
    fn letter(&self) -> u8 {
        match self {
            Ctrl::Insert => b'I',
            Ctrl::Delete => b'D',
            Ctrl::End => b'E',
        }
    }

    fn from_letter(c: u8) -> Option<Ctrl> {
        match c {
            b'I' => Some(Ctrl::Insert),
            b'D' => Some(Ctrl::Delete),
            b'E' => Some(Ctrl::End),
            _ => None,
        }
    }
}

/// One line of the body: either raw data, or a control marker opening/closing a region.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BodyLine {
    Data(Vec<u8>),
    Control(Ctrl, SeqNo),
}

/// Streams the body of a history file one line at a time, past the metadata that
/// [`HistoryCodec::read`] has already materialised into the [`Header`].
pub struct BodyCursor<R> {
    lines: LineBuf<R>,
}

impl<R: BufRead> BodyCursor<R> {
    pub fn next_line(&mut self) -> Result<Option<BodyLine>> {
        let raw = match self.lines.read_line()? {
            None => return Ok(None),
            Some(raw) => raw,
        };
        Ok(Some(parse_body_line(&raw)?))
    }
}

fn parse_body_line(raw: &[u8]) -> Result<BodyLine> {
    if raw.first() == Some(&SOH) {
        if raw.len() < 3 {
            return Err(malformed("body control line too short"));
        }
        let ctrl = Ctrl::from_letter(raw[1])
            .ok_or_else(|| malformed("unrecognised body control letter"))?;
        let rest = std::str::from_utf8(&raw[2..])
            .map_err(|_| malformed("non-utf8 body control line"))?
            .trim();
        let seq: SeqNo = rest.parse()?;
        Ok(BodyLine::Control(ctrl, seq))
    } else {
        Ok(BodyLine::Data(raw.to_vec()))
    }
}

/// Read/write of the history-file grammar. Stateless: every method takes the paths it needs.
pub struct HistoryCodec;

impl HistoryCodec {
    /// Parse the metadata section of `path` and return it together with a [`BodyCursor`]
    /// ready to stream the body. The stored checksum is parsed but not verified; see
    /// [`HistoryCodec::verify_checksum`].
    pub fn read<P: AsRef<Path>>(path: P) -> Result<(Header, u16, BodyCursor<BufReader<File>>)> {
        let f = File::open(path.as_ref())?;
        let mut lines = LineBuf::new(BufReader::new(f));

        let first = lines
            .read_line()?
            .ok_or_else(|| Error::UnexpectedEof)?;
        if first.len() < 3 || first[0] != SOH || first[1] != b'h' {
            return Err(Error::NotAnSccsHistoryFile {
                detail: "first line is not a checksum header (^Ah)".to_string(),
            });
        }
        let checksum_text = std::str::from_utf8(&first[2..])
            .map_err(|_| malformed("non-utf8 checksum header"))?
            .trim();
        let stored_checksum: u16 = checksum_text.parse()?;

        let mut deltas = Vec::new();
        loop {
            let line = peek_required(&mut lines)?;
            if line.first() != Some(&SOH) || line.get(1) != Some(&b's') {
                break;
            }
            let counts_line = lines.read_line()?.ok_or(Error::UnexpectedEof)?;
            deltas.push(read_one_delta(&mut lines, &counts_line)?);
        }

        let mut users = Vec::new();
        {
            let open = peek_required(&mut lines)?;
            if open.as_slice() == [SOH, b'u'] {
                lines.read_line()?;
                loop {
                    let line = lines.read_line()?.ok_or(Error::UnexpectedEof)?;
                    if line.as_slice() == [SOH, b'U'] {
                        break;
                    }
                    users.push(String::from_utf8_lossy(&line).into_owned());
                }
            }
        }

        let mut flags = Flags::new();
        loop {
            let line = peek_required(&mut lines)?;
            if line.first() != Some(&SOH) || line.get(1) != Some(&b'f') {
                break;
            }
            lines.read_line()?;
            let body = std::str::from_utf8(&line[2..])
                .map_err(|_| malformed("non-utf8 flag line"))?;
            let mut chars = body.chars();
            let letter = chars.next().ok_or_else(|| malformed("empty flag line"))?;
            flags.apply_line(letter, chars.as_str())?;
        }

        let mut comments = Vec::new();
        {
            let open = peek_required(&mut lines)?;
            if open.as_slice() == [SOH, b't'] {
                lines.read_line()?;
                loop {
                    let line = lines.read_line()?.ok_or(Error::UnexpectedEof)?;
                    if line.as_slice() == [SOH, b'T'] {
                        break;
                    }
                    comments.push(String::from_utf8_lossy(&line).into_owned());
                }
            }
        }

        let header = Header {
            delta_table: DeltaTable::from_deltas(deltas),
            users,
            flags,
            comments,
        };

        Ok((header, stored_checksum, BodyCursor { lines }))
    }

    /// Write a complete history file: `header`, a freshly computed checksum, and the body
    /// produced by draining `body`. Writes to `tmp_path` first; on success, atomically renames
    /// `tmp_path` onto `final_path`. A failure at any point before the rename leaves
    /// `final_path` untouched, and the caller is responsible for removing `tmp_path`.
    pub fn write<P: AsRef<Path>, Q: AsRef<Path>>(
        final_path: P,
        tmp_path: Q,
        header: &Header,
        body: impl IntoIterator<Item = BodyLine>,
    ) -> Result<()> {
        // The checksum covers every byte written after the header line, so the rest of the
        // file is assembled in memory first.
        let mut buf = Vec::new();
        write_metadata(&mut buf, header)?;
        write_body(&mut buf, body)?;

        let checksum = buf.iter().fold(0u32, |acc, &b| acc + b as u32) as u16;

        let final_path = final_path.as_ref();
        reject_hard_links(final_path)?;
        let tmp_path = tmp_path.as_ref();
        let mut out = BufWriter::new(File::create(tmp_path)?);
        writeln!(out, "\x01h{:05}", checksum)?;
        out.write_all(&buf)?;
        out.flush()?;
        drop(out);

        fs::rename(tmp_path, final_path)?;
        Ok(())
    }

    /// Re-read `path` byte-for-byte and compare the stored checksum against a freshly computed
    /// one, independent of (and more expensive than) [`HistoryCodec::read`].
    pub fn verify_checksum<P: AsRef<Path>>(path: P) -> Result<()> {
        let mut f = BufReader::new(File::open(path.as_ref())?);
        let mut first_line = Vec::new();
        let n = f.read_until(b'\n', &mut first_line)?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        if first_line.len() < 3 || first_line[0] != SOH || first_line[1] != b'h' {
            return Err(Error::NotAnSccsHistoryFile {
                detail: "first line is not a checksum header (^Ah)".to_string(),
            });
        }
        let text = std::str::from_utf8(&first_line[2..trim_newline(&first_line)])
            .map_err(|_| malformed("non-utf8 checksum header"))?
            .trim();
        let stored: u16 = text.parse()?;

        let mut rest = Vec::new();
        f.read_to_end(&mut rest)?;
        let computed = rest.iter().fold(0u32, |acc, &b| acc + b as u32) as u16;

        if stored != computed {
            return Err(Error::ChecksumMismatch { stored, computed });
        }
        Ok(())
    }

    /// Recompute the checksum of `path` and rewrite only the header line (`admin -z`,
    /// `FixChecksum` mode, §4.1).
    pub fn fix_checksum<P: AsRef<Path>>(path: P) -> Result<()> {
        let mut f = BufReader::new(File::open(path.as_ref())?);
        let mut first_line = Vec::new();
        let n = f.read_until(b'\n', &mut first_line)?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        if first_line.len() < 3 || first_line[0] != SOH || first_line[1] != b'h' {
            return Err(Error::NotAnSccsHistoryFile {
                detail: "first line is not a checksum header (^Ah)".to_string(),
            });
        }
        let mut rest = Vec::new();
        f.read_to_end(&mut rest)?;
        let computed = rest.iter().fold(0u32, |acc, &b| acc + b as u32) as u16;
        drop(f);

        let tmp_path = path.as_ref().with_extension("checksum-tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp_path)?);
            writeln!(out, "\x01h{:05}", computed)?;
            out.write_all(&rest)?;
        }
        fs::rename(&tmp_path, path.as_ref())?;
        Ok(())
    }
}

/// Refuse to mutate a history file that has hard links: a sibling rename would only update
/// one of its names, silently diverging the others from the revision history (§4.1, §4.6).
#[cfg(unix)]
fn reject_hard_links(path: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;
    match fs::metadata(path) {
        Ok(meta) if meta.nlink() > 1 => Err(Error::FileHasHardLinks(path.to_path_buf())),
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(not(unix))]
fn reject_hard_links(_path: &Path) -> Result<()> {
    Ok(())
}

fn trim_newline(line: &[u8]) -> usize {
    let mut end = line.len();
    if line.last() == Some(&b'\n') {
        end -= 1;
        if line.get(end.wrapping_sub(1)) == Some(&b'\r') {
            end -= 1;
        }
    }
    end
}

fn read_one_delta<R: BufRead>(lines: &mut LineBuf<R>, counts_line: &[u8]) -> Result<Delta> {
    let counts = std::str::from_utf8(&counts_line[2..])
        .map_err(|_| malformed("non-utf8 counts line"))?
        .trim();
    let mut parts = counts.split('/');
    let inserted: u32 = parts.next().ok_or_else(|| malformed("missing insert count"))?.parse()?;
    let deleted: u32 = parts.next().ok_or_else(|| malformed("missing delete count"))?.parse()?;
    let unchanged: u32 = parts.next().ok_or_else(|| malformed("missing unchanged count"))?.parse()?;

    let desc = lines.read_line()?.ok_or(Error::UnexpectedEof)?;
    if desc.first() != Some(&SOH) || desc.get(1) != Some(&b'd') {
        return Err(malformed("expected ^Ad descriptor line"));
    }
    let desc_text = std::str::from_utf8(&desc[2..])
        .map_err(|_| malformed("non-utf8 descriptor line"))?;
    let mut fields = desc_text.split_whitespace();
    let kind_letter = fields.next().ok_or_else(|| malformed("missing delta type"))?;
    let kind = DeltaKind::from_letter(
        kind_letter.chars().next().ok_or_else(|| malformed("empty delta type"))?,
    );
    let sid: Sid = fields.next().ok_or_else(|| malformed("missing sid"))?.parse()?;
    let date_part = fields.next().ok_or_else(|| malformed("missing date"))?;
    let time_part = fields.next().ok_or_else(|| malformed("missing time"))?;
    let date = Date::parse(&format!("{} {}", date_part, time_part))?;
    let user = fields.next().ok_or_else(|| malformed("missing user"))?.to_string();
    let seq: SeqNo = fields.next().ok_or_else(|| malformed("missing seq"))?.parse()?;
    let prev_seq: SeqNo = fields.next().ok_or_else(|| malformed("missing prev seq"))?.parse()?;

    let mut included = SeqSet::absent();
    let mut excluded = SeqSet::absent();
    let mut ignored = SeqSet::absent();
    loop {
        let line = peek_required(lines)?;
        let letter = match (line.first(), line.get(1)) {
            (Some(&SOH), Some(&c)) => c,
            _ => return Err(malformed("truncated delta record")),
        };
        let set = match letter {
            b'i' => &mut included,
            b'x' => &mut excluded,
            b'g' => &mut ignored,
            _ => break,
        };
        lines.read_line()?;
        let body = std::str::from_utf8(&line[2..]).map_err(|_| malformed("non-utf8 seq set line"))?;
        set.present = true;
        for tok in body.split_whitespace() {
            set.seqs.push(tok.parse()?);
        }
    }

    let mut mrs = Vec::new();
    loop {
        let line = peek_required(lines)?;
        if line.first() != Some(&SOH) || line.get(1) != Some(&b'm') {
            break;
        }
        lines.read_line()?;
        mrs.push(String::from_utf8_lossy(&line[2..]).into_owned());
    }

    let mut comments = Vec::new();
    loop {
        let line = peek_required(lines)?;
        if line.first() != Some(&SOH) || line.get(1) != Some(&b'c') {
            break;
        }
        lines.read_line()?;
        comments.push(String::from_utf8_lossy(&line[2..]).into_owned());
    }

    let terminator = lines.read_line()?.ok_or(Error::UnexpectedEof)?;
    if terminator.as_slice() != [SOH, b'e'] {
        return Err(malformed("expected ^Ae delta terminator"));
    }

    Ok(Delta {
        kind,
        sid,
        date,
        user,
        seq,
        prev_seq,
        inserted,
        deleted,
        unchanged,
        included,
        excluded,
        ignored,
        mrs,
        comments,
    })
}

/// Peek at the next raw line without consuming it, by reading and stashing it back onto the
/// reader. `LineBuf` has no native pushback, so the parser instead re-derives "what kind of
/// line is this" through a one-line lookahead buffer carried by the caller loops above; this
/// helper centralises the "peek or EOF is an error" policy used by every metadata section.
fn peek_required<R: BufRead>(lines: &mut LineBuf<R>) -> Result<Vec<u8>> {
    lines.peek_line()?.ok_or(Error::UnexpectedEof)
}

fn write_metadata(buf: &mut Vec<u8>, header: &Header) -> Result<()> {
    for delta in header.delta_table.iter() {
        writeln!(
            buf,
            "\x01s{:05}/{:05}/{:05}",
            delta.inserted, delta.deleted, delta.unchanged
        )?;
        writeln!(
            buf,
            "\x01d{} {} {} {} {} {} {}",
            delta.kind.letter(),
            delta.sid,
            delta.date.format_letter('D'),
            delta.date.format_letter('T'),
            delta.user,
            delta.seq,
            delta.prev_seq
        )?;
        write_seq_set(buf, b'i', &delta.included)?;
        write_seq_set(buf, b'x', &delta.excluded)?;
        write_seq_set(buf, b'g', &delta.ignored)?;
        for mr in &delta.mrs {
            writeln!(buf, "\x01m{}", mr)?;
        }
        for comment in &delta.comments {
            writeln!(buf, "\x01c{}", comment)?;
        }
        writeln!(buf, "\x01e")?;
    }

    if !header.users.is_empty() {
        writeln!(buf, "\x01u")?;
        for u in &header.users {
            writeln!(buf, "{}", u)?;
        }
        writeln!(buf, "\x01U")?;
    }

    for line in header.flags.to_lines() {
        writeln!(buf, "\x01f{}", line)?;
    }

    if !header.comments.is_empty() {
        writeln!(buf, "\x01t")?;
        for c in &header.comments {
            writeln!(buf, "{}", c)?;
        }
        writeln!(buf, "\x01T")?;
    }

    Ok(())
}

fn write_seq_set(buf: &mut Vec<u8>, letter: u8, set: &SeqSet) -> Result<()> {
    if !set.present {
        return Ok(());
    }
    let joined = set.seqs.iter().map(|s| s.to_string()).collect::<Vec<_>>().join(" ");
    writeln!(buf, "\x01{}{}", letter as char, joined)?;
    Ok(())
}

fn write_body(buf: &mut Vec<u8>, body: impl IntoIterator<Item = BodyLine>) -> Result<()> {
    for line in body {
        match line {
            BodyLine::Data(data) => {
                buf.extend_from_slice(&data);
                buf.push(b'\n');
            }
            BodyLine::Control(ctrl, seq) => {
                writeln!(buf, "\x01{}{}", ctrl.letter() as char, seq)?;
            }
        }
    }
    Ok(())
}

fn malformed(msg: &str) -> Error {
    Error::Malformed(msg.to_string())
}
