//! `sccs-naming` derives the family of sibling file names an SCCS history file needs
//! (`p.`, `z.`, `x.`, `d.`, `u.`, `l.`, the g-file) and implements the advisory `z.` mutation
//! lock used to serialize writers (§4.7, §6.2).
//!
//! Everything here is pure path/filesystem bookkeeping: it has no notion of what a history
//! file's *contents* look like (that is `sccs-weave`'s job) and no notion of deltas or Sids.

#![warn(bare_trait_objects)]

mod errors;

pub use errors::{Error, Result};

use log::{info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

/// Derives the sibling file names that surround one history file, given its `s.NAME` path.
///
/// All names live in the same directory as the `s.` file, differing only in the one-letter
/// prefix (§6.2), except for the g-file, whose name is simply `NAME` (no prefix) — the
/// extracted working copy a user actually edits.
#[derive(Clone, Debug)]
pub struct HistoryName {
    dir: PathBuf,
    base: String,
}

impl HistoryName {
    /// Derive a `HistoryName` from the path of an `s.` file. Fails if the file name does not
    /// begin with `s.` (`NotAnSccsHistoryFileName`, §4.1).
    pub fn from_s_file<P: AsRef<Path>>(path: P) -> Result<HistoryName> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .ok_or_else(|| Error::NotAnSccsHistoryFileName(path.to_path_buf()))?;
        let base = filename
            .strip_prefix("s.")
            .ok_or_else(|| Error::NotAnSccsHistoryFileName(path.to_path_buf()))?;
        Ok(HistoryName { dir, base: base.to_string() })
    }

    /// Build a `HistoryName` directly from a directory and the bare base name (without the
    /// `s.` prefix), for `Admin::create`, which has no existing `s.` file to parse a name from.
    pub fn new<P: AsRef<Path>>(dir: P, base: &str) -> HistoryName {
        HistoryName { dir: dir.as_ref().to_path_buf(), base: base.to_string() }
    }

    fn sibling(&self, prefix: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", prefix, self.base))
    }

    pub fn s_file(&self) -> PathBuf {
        self.sibling("s")
    }

    pub fn p_file(&self) -> PathBuf {
        self.sibling("p")
    }

    pub fn z_file(&self) -> PathBuf {
        self.sibling("z")
    }

    pub fn x_file(&self) -> PathBuf {
        self.sibling("x")
    }

    pub fn d_file(&self) -> PathBuf {
        self.sibling("d")
    }

    pub fn u_file(&self) -> PathBuf {
        self.sibling("u")
    }

    pub fn l_file(&self) -> PathBuf {
        self.sibling("l")
    }

    /// The extracted working copy: the bare base name, in the same directory.
    pub fn g_file(&self) -> PathBuf {
        self.dir.join(&self.base)
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// An advisory lock on one history file's `z.` file, acquired with `O_EXCL` (§4.7).
///
/// On Unix, the lock content is the locker's PID, which lets a later acquirer detect and break
/// a stale lock left behind by a crashed process. The lock is released either explicitly via
/// [`FileLock::release`] or implicitly when the guard is dropped, so that every exit path out
/// of a mutation (including an early `?`) releases it (§5, "a write operation... releases it on
/// every exit path").
pub struct FileLock {
    path: PathBuf,
    held: bool,
}

impl FileLock {
    /// Attempt to acquire the lock for `name`. Non-blocking: fails immediately with
    /// `LockHeld` if another live process holds it. A lock whose recorded PID is no longer
    /// running is considered stale and is broken automatically.
    pub fn acquire(name: &HistoryName) -> Result<FileLock> {
        let path = name.z_file();
        match try_create(&path) {
            Ok(()) => {
                info!("acquired lock {:?}", path);
                return Ok(FileLock { path, held: true });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => (),
            Err(e) => return Err(e.into()),
        }

        if is_stale(&path) {
            warn!("breaking stale lock {:?}", path);
            fs::remove_file(&path)?;
            try_create(&path)?;
            return Ok(FileLock { path, held: true });
        }

        Err(Error::LockHeld(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release the lock early, rather than waiting for `Drop`. Used so a successful mutation
    /// can report a release failure instead of silently swallowing it in a destructor.
    pub fn release(mut self) -> Result<()> {
        self.do_release()
    }

    fn do_release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        self.held = false;
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.do_release() {
            warn!("error releasing lock {:?}: {}", self.path, e);
        }
    }
}

fn try_create(path: &Path) -> std::io::Result<()> {
    let mut f = OpenOptions::new().write(true).create_new(true).open(path)?;
    write!(f, "{}", current_pid())?;
    Ok(())
}

#[cfg(unix)]
fn current_pid() -> u32 {
    unsafe { libc::getpid() as u32 }
}

#[cfg(not(unix))]
fn current_pid() -> u32 {
    0
}

/// A lock file is stale if it names a PID that is no longer alive. On non-Unix platforms (or
/// if the content can't be parsed) a lock's mere presence is authoritative, matching the
/// "dumb platforms" fallback in §4.7.
fn is_stale(path: &Path) -> bool {
    #[cfg(unix)]
    {
        let mut contents = String::new();
        if File::open(path).and_then(|mut f| f.read_to_string(&mut contents)).is_err() {
            return false;
        }
        match contents.trim().parse::<i32>() {
            Ok(pid) if pid > 0 => !process_is_alive(pid),
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        false
    }
}

#[cfg(unix)]
fn process_is_alive(pid: i32) -> bool {
    // kill(pid, 0) performs no signal delivery, only existence/permission checks.
    unsafe { libc::kill(pid, 0) == 0 }
}

/// Construct a brand-new, empty temp file in the same directory as `name`'s history file, with
/// a name not derived from the SCCS single-letter convention — used for scratch files such as
/// the uuencode spool during binary-body detection (§4.6).
pub fn scratch_file(name: &HistoryName, suffix: &str) -> Result<(PathBuf, File)> {
    let path = name.dir.join(format!(".{}.{}.tmp", name.base, suffix));
    let f = OpenOptions::new().write(true).create_new(true).open(&path)?;
    Ok((path, f))
}
