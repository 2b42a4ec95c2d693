//! The three small extension points the engine consumes from its embedder (§6.6, §9
//! "Polymorphic capability sets"): producing a diff, naming the current user, and validating an
//! MR list. Each has exactly one concrete, crate-provided implementation so the engine is usable
//! standalone, while the trait boundary is the intended place for an embedder to substitute its
//! own.

use std::env;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::{Command, Stdio};

use regex::Regex;

use crate::errors::{Error, Result};

/// One hunk of a classical `ed`-style diff script (`NaddM`, `NdelM`, `NcM`), as produced by
/// `diff` with no flags.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EdHunk {
    /// The first line of the old file the hunk addresses.
    pub left: u32,
    /// The last line of the old file the hunk addresses (equal to `left` for a single-line
    /// hunk).
    pub right: u32,
    pub op: EdOp,
    /// The new text to insert, for `Add`/`Change`; empty for `Delete`.
    pub added_lines: Vec<Vec<u8>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdOp {
    Add,
    Delete,
    Change,
}

/// Produces a classical `ed`-style diff script between two files. §1 keeps the actual diff
/// algorithm out of scope for the engine core; this is the seam an embedder may replace.
pub trait LineDiff {
    fn diff(&self, old: &Path, new: &Path) -> Result<Vec<EdHunk>>;
}

/// Shells out to the system `diff` utility and parses its output: spawn `diff old new`, scan
/// each output line against `(\d+)(,(\d+))?([acd]).*$` to recognise a command line, and collect
/// the `> ` lines that follow an `a`/`c` command as the hunk's added text.
#[derive(Clone, Debug, Default)]
pub struct ProcessLineDiff {
    command_re: Regex,
}

impl ProcessLineDiff {
    pub fn new() -> ProcessLineDiff {
        ProcessLineDiff { command_re: Regex::new(r"^(\d+)(,(\d+))?([acd]).*$").unwrap() }
    }
}

impl LineDiff for ProcessLineDiff {
    fn diff(&self, old: &Path, new: &Path) -> Result<Vec<EdHunk>> {
        let mut child = Command::new("diff")
            .arg(old.as_os_str())
            .arg(new.as_os_str())
            .stdout(Stdio::piped())
            .spawn()?;

        let mut hunks = Vec::new();
        {
            let stdout = child.stdout.as_mut().expect("piped stdout");
            let mut lines = BufReader::new(stdout).lines();
            let mut current: Option<EdHunk> = None;

            while let Some(line) = lines.next() {
                let line = line?;
                if let Some(cap) = self.command_re.captures(&line) {
                    if let Some(hunk) = current.take() {
                        hunks.push(hunk);
                    }
                    let left: u32 = cap[1].parse().expect("digits");
                    let right: u32 = match cap.get(3) {
                        None => left,
                        Some(m) => m.as_str().parse().expect("digits"),
                    };
                    let op = match &cap[4] {
                        "a" => EdOp::Add,
                        "d" => EdOp::Delete,
                        "c" => EdOp::Change,
                        other => return Err(diff_parse_error(&line, other)),
                    };
                    current = Some(EdHunk { left, right, op, added_lines: Vec::new() });
                    continue;
                }

                match line.chars().next() {
                    Some('<') | Some('-') => (),
                    Some('>') => {
                        if let Some(hunk) = current.as_mut() {
                            // `diff` prefixes added lines with "> ".
                            hunk.added_lines.push(line.as_bytes()[2..].to_vec());
                        }
                    }
                    _ => (),
                }
            }

            if let Some(hunk) = current.take() {
                hunks.push(hunk);
            }
        }

        let status = child.wait()?;
        // `diff` exits 0 (no differences), 1 (differences found), or >1 (trouble); only the
        // last is an actual failure.
        match status.code() {
            Some(0) | Some(1) => Ok(hunks),
            Some(code) => Err(Error::NoAuthorisation(format!("diff exited with status {}", code))),
            None => Err(Error::NoAuthorisation("diff was killed by a signal".to_string())),
        }
    }
}

fn diff_parse_error(line: &str, cmd: &str) -> Error {
    Error::NoAuthorisation(format!("unrecognised diff command {:?} in line {:?}", cmd, line))
}

/// Names the user on whose behalf the engine is operating.
pub trait UserInfo {
    fn current_user(&self) -> String;
}

/// Reads `$USER`, falling back to `$LOGNAME`, and finally to `"unknown"` if neither is set.
#[derive(Clone, Copy, Debug, Default)]
pub struct EnvUserInfo;

impl UserInfo for EnvUserInfo {
    fn current_user(&self) -> String {
        env::var("USER")
            .or_else(|_| env::var("LOGNAME"))
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

/// Runs the v-flag's named program against a delta's MR list, treating a nonzero exit as
/// rejection.
pub trait MrValidator {
    fn validate(&self, program: &str, mrs: &[String]) -> Result<()>;
}

/// Accepts every MR list unconditionally; the default when no `v` flag is set on the file.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoMrValidator;

impl MrValidator for NoMrValidator {
    fn validate(&self, _program: &str, _mrs: &[String]) -> Result<()> {
        Ok(())
    }
}

/// Spawns `program` with each MR as an argument; a nonzero exit rejects the whole list.
#[derive(Clone, Debug, Default)]
pub struct ProcessMrValidator;

impl MrValidator for ProcessMrValidator {
    fn validate(&self, program: &str, mrs: &[String]) -> Result<()> {
        let status = Command::new(program).args(mrs).status()?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::MrRejected {
                mr: mrs.join(","),
                detail: format!("validator {:?} rejected the MR list", program),
            })
        }
    }
}
