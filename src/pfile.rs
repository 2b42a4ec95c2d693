//! Checkout state (§3.4): the sibling p-file listing every outstanding `get -e` lock on a
//! history file.

use std::fs;
use std::io::Write;
use std::path::Path;

use sccs_weave::{Sid, SidRange};

use crate::errors::{Error, Result};

/// One outstanding checkout: the delta it was gotten from, the Sid it will become when
/// delta'd, and the include/exclude lists recorded at `get` time so `delta` can carry them
/// forward onto the new delta (§4.5 step 6).
#[derive(Clone, Debug, PartialEq)]
pub struct PEntry {
    pub got: Sid,
    pub assigned: Sid,
    pub user: String,
    pub include: Vec<SidRange>,
    pub exclude: Vec<SidRange>,
}

/// The parsed contents of a `p.NAME` file: zero or more outstanding checkouts.
#[derive(Clone, Debug, Default)]
pub struct PFile {
    entries: Vec<PEntry>,
}

impl PFile {
    pub fn new() -> PFile {
        PFile::default()
    }

    /// Load an existing p-file, or an empty one if none exists yet.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<PFile> {
        let path = path.as_ref();
        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(PFile::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for line in text.lines() {
            entries.push(parse_entry(line)?);
        }
        Ok(PFile { entries })
    }

    pub fn entries(&self) -> &[PEntry] {
        &self.entries
    }

    /// Add a new checkout entry, enforcing the invariants from §3.4: the new `assigned` Sid
    /// must not collide with any existing entry's `assigned` Sid.
    pub fn add_entry(&mut self, entry: PEntry) -> Result<()> {
        if self.entries.iter().any(|e| e.assigned == entry.assigned) {
            return Err(Error::DuplicateCheckout(entry.assigned.to_string()));
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Find the unique entry whose `got` Sid matches the caller's claim (the lookup `delta`
    /// performs in §4.5 step 1).
    pub fn find_by_got(&self, got: Sid) -> Option<&PEntry> {
        self.entries.iter().find(|e| e.got == got)
    }

    /// Remove the entry whose `assigned` Sid matches (consumed by `DeltaRecord` on success, or
    /// by an explicit "unget").
    pub fn remove_by_assigned(&mut self, assigned: Sid) -> Result<PEntry> {
        let idx = self
            .entries
            .iter()
            .position(|e| e.assigned == assigned)
            .ok_or(Error::NoSuchCheckout)?;
        Ok(self.entries.remove(idx))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the p-file back out, or remove it entirely if no checkouts remain (matching the
    /// classical tool's behaviour of not leaving an empty `p.NAME` lying around).
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if self.entries.is_empty() {
            match fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        } else {
            let mut out = fs::File::create(path)?;
            for entry in &self.entries {
                writeln!(out, "{}", format_entry(entry))?;
            }
            Ok(())
        }
    }
}

/// The p-file always spells out all four Sid components, even for a trunk revision whose
/// `Display` impl prints only `release.level` — otherwise reloading a saved entry would fail to
/// parse as a full Sid.
fn sid_full_string(sid: &Sid) -> String {
    format!("{}.{}.{}.{}", sid.release, sid.level, sid.branch, sid.sequence)
}

fn format_entry(entry: &PEntry) -> String {
    let mut out =
        format!("{} {} {}", sid_full_string(&entry.got), sid_full_string(&entry.assigned), entry.user);
    if !entry.include.is_empty() {
        out.push_str(" -i");
        out.push_str(&format_ranges(&entry.include));
    }
    if !entry.exclude.is_empty() {
        out.push_str(" -x");
        out.push_str(&format_ranges(&entry.exclude));
    }
    out
}

/// Multiple ranges are joined with `;`; within one range, `from,to` already uses `,`, so `;`
/// avoids ambiguity between "next range" and "range upper bound".
fn format_ranges(ranges: &[SidRange]) -> String {
    ranges
        .iter()
        .map(|r| match r.to {
            Some(to) => format!("{},{}", sid_full_string(&r.from), sid_full_string(&to)),
            None => sid_full_string(&r.from),
        })
        .collect::<Vec<_>>()
        .join(";")
}

fn parse_entry(line: &str) -> Result<PEntry> {
    let mut fields = line.split_whitespace();
    let got: Sid = parse_sid(&mut fields, line)?;
    let assigned: Sid = parse_sid(&mut fields, line)?;
    let user = fields.next().ok_or_else(|| malformed(line))?.to_string();

    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for field in fields {
        if let Some(rest) = field.strip_prefix("-i") {
            include.extend(parse_ranges(rest)?);
        } else if let Some(rest) = field.strip_prefix("-x") {
            exclude.extend(parse_ranges(rest)?);
        }
    }

    Ok(PEntry { got, assigned, user, include, exclude })
}

fn parse_sid<'a>(fields: &mut impl Iterator<Item = &'a str>, line: &str) -> Result<Sid> {
    fields
        .next()
        .ok_or_else(|| malformed(line))?
        .parse::<Sid>()
        .map_err(|e| Error::Weave(e))
}

fn parse_ranges(text: &str) -> Result<Vec<SidRange>> {
    text.split(';').map(|part| part.parse::<SidRange>().map_err(Error::Weave)).collect()
}

fn malformed(line: &str) -> Error {
    Error::Weave(sccs_weave::Error::Malformed(format!("bad p-file line {:?}", line)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(got: &str, assigned: &str) -> PEntry {
        PEntry {
            got: got.parse().unwrap(),
            assigned: assigned.parse().unwrap(),
            user: "tester".to_string(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempdir::TempDir::new("sccs-pfile").unwrap();
        let path = dir.path().join("p.x");

        let mut pf = PFile::new();
        pf.add_entry(entry("1.1.0.0", "1.2.0.0")).unwrap();
        pf.save(&path).unwrap();

        let reloaded = PFile::load(&path).unwrap();
        assert_eq!(reloaded.entries().len(), 1);
        assert_eq!(reloaded.entries()[0].got, "1.1.0.0".parse().unwrap());
    }

    #[test]
    fn rejects_duplicate_assigned_sid() {
        let mut pf = PFile::new();
        pf.add_entry(entry("1.1.0.0", "1.2.0.0")).unwrap();
        assert!(matches!(
            pf.add_entry(entry("1.2.0.0", "1.2.0.0")),
            Err(Error::DuplicateCheckout(_))
        ));
    }

    #[test]
    fn save_of_empty_pfile_removes_it() {
        let dir = tempdir::TempDir::new("sccs-pfile").unwrap();
        let path = dir.path().join("p.x");
        fs::write(&path, "1.1.0.0 1.2.0.0 tester\n").unwrap();

        let mut pf = PFile::load(&path).unwrap();
        pf.remove_by_assigned("1.2.0.0".parse().unwrap()).unwrap();
        pf.save(&path).unwrap();

        assert!(!path.exists());
    }
}
