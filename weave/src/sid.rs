//! Version identifiers.
//!
//! A full [`Sid`] is the classical `release.level.branch.sequence` quadruple; trunk
//! revisions always carry `branch == 0 && sequence == 0`. A [`PartialSid`] is what a caller
//! types on the command line when they don't know (or don't care about) the full identifier:
//! just a release, or a release and a level.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::errors::{Error, Result};

/// A dense, never-reused sequence number internal to one history file. Sequence `0` is
/// reserved to mean "no predecessor" (only ever seen as the `prev_seq` of the root delta).
pub type SeqNo = u32;

/// A fully qualified version identifier: `release.level[.branch.sequence]`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Sid {
    pub release: u32,
    pub level: u32,
    pub branch: u32,
    pub sequence: u32,
}

impl Sid {
    /// The very first revision of a brand-new history file.
    pub fn root() -> Sid {
        Sid { release: 1, level: 1, branch: 0, sequence: 0 }
    }

    pub fn trunk(release: u32, level: u32) -> Sid {
        Sid { release, level, branch: 0, sequence: 0 }
    }

    pub fn branch(release: u32, level: u32, branch: u32, sequence: u32) -> Sid {
        Sid { release, level, branch, sequence }
    }

    pub fn is_trunk(&self) -> bool {
        self.branch == 0 && self.sequence == 0
    }

    /// The next trunk revision after this one (`release.level` -> `release.(level+1)`).
    pub fn next_trunk(&self) -> Sid {
        Sid::trunk(self.release, self.level + 1)
    }

    /// The next delta within the same branch as this one (`sequence + 1`). Only meaningful
    /// when `self` is itself a branch revision.
    pub fn next_in_branch(&self) -> Sid {
        Sid::branch(self.release, self.level, self.branch, self.sequence + 1)
    }

    /// Choose a fresh branch number off of this trunk (or branch) revision, given the branch
    /// numbers already in use at this `release.level`, and return the first delta on it
    /// (`sequence == 1`).
    pub fn first_branch(&self, existing_branches: &[u32]) -> Sid {
        let next = existing_branches.iter().copied().max().unwrap_or(0) + 1;
        Sid::branch(self.release, self.level, next, 1)
    }

    /// This Sid, reduced to just its release.
    pub fn release_only(&self) -> PartialSid {
        PartialSid::Release(self.release)
    }

    /// This Sid, reduced to its release and level.
    pub fn release_level(&self) -> PartialSid {
        PartialSid::ReleaseLevel(self.release, self.level)
    }

    pub fn partial_sid(&self) -> PartialSid {
        PartialSid::Full(*self)
    }
}

impl fmt::Display for Sid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_trunk() {
            write!(f, "{}.{}", self.release, self.level)
        } else {
            write!(f, "{}.{}.{}.{}", self.release, self.level, self.branch, self.sequence)
        }
    }
}

/// Ordering follows the classical SCCS total order: release, then level, then branch, then
/// sequence, each compared numerically (trunk, with branch/sequence zero, sorts before any
/// branch off of the same release.level).
impl Ord for Sid {
    fn cmp(&self, other: &Sid) -> Ordering {
        (self.release, self.level, self.branch, self.sequence)
            .cmp(&(other.release, other.level, other.branch, other.sequence))
    }
}

impl PartialOrd for Sid {
    fn partial_cmp(&self, other: &Sid) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl FromStr for Sid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Sid> {
        match PartialSid::from_str(s)? {
            PartialSid::Full(sid) => Ok(sid),
            _ => Err(Error::Malformed(format!("Sid {:?} is not fully qualified", s))),
        }
    }
}

/// A version identifier that may be incompletely specified, as accepted by `get -r`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PartialSid {
    Release(u32),
    ReleaseLevel(u32, u32),
    Full(Sid),
}

impl FromStr for PartialSid {
    type Err = Error;

    fn from_str(s: &str) -> Result<PartialSid> {
        let parts: Vec<&str> = s.split('.').collect();
        let parse_part = |p: &str| -> Result<u32> {
            p.parse::<u32>().map_err(|_| Error::Malformed(format!("bad Sid component {:?}", p)))
        };

        match parts.len() {
            1 => Ok(PartialSid::Release(parse_part(parts[0])?)),
            2 => Ok(PartialSid::ReleaseLevel(parse_part(parts[0])?, parse_part(parts[1])?)),
            4 => Ok(PartialSid::Full(Sid {
                release: parse_part(parts[0])?,
                level: parse_part(parts[1])?,
                branch: parse_part(parts[2])?,
                sequence: parse_part(parts[3])?,
            })),
            _ => Err(Error::Malformed(format!("malformed Sid {:?}", s))),
        }
    }
}

impl fmt::Display for PartialSid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PartialSid::Release(r) => write!(f, "{}", r),
            PartialSid::ReleaseLevel(r, l) => write!(f, "{}.{}", r, l),
            PartialSid::Full(sid) => write!(f, "{}", sid),
        }
    }
}

/// A range expression over Sids, as used by the `-i`/`-x` include/exclude lists: either a
/// single Sid, or an inclusive `from,to` pair.
#[derive(Clone, Copy, Debug)]
pub struct SidRange {
    pub from: Sid,
    pub to: Option<Sid>,
}

impl SidRange {
    pub fn single(sid: Sid) -> SidRange {
        SidRange { from: sid, to: None }
    }

    pub fn contains(&self, sid: Sid) -> bool {
        match self.to {
            None => self.from == sid,
            Some(to) => self.from <= sid && sid <= to,
        }
    }
}

impl FromStr for SidRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<SidRange> {
        match s.split_once(',') {
            Some((from, to)) => Ok(SidRange { from: from.parse()?, to: Some(to.parse()?) }),
            None => Ok(SidRange::single(s.parse()?)),
        }
    }
}
