//! A growable line reader.
//!
//! The classical implementation (`cssc_linebuf`) grows a fixed `fgets` buffer in chunks
//! because C's NUL-terminated strings can't represent an embedded NUL byte in a line. Rust's
//! `Vec<u8>`/`String` carry an explicit length, so there's no chunking to do; `LineBuf` is
//! kept anyway as the single place that reads "one line, raw bytes, tolerant of anything
//! short of the final unterminated line" so that callers don't each re-derive that policy,
//! and so the (likely) binary uuencoded body can be read without ever assuming UTF-8.

use std::io::{self, BufRead};

/// Reads raw lines (without the trailing newline) from any `BufRead`, preserving embedded NUL
/// bytes and non-UTF-8 content.
pub struct LineBuf<R> {
    inner: R,
    pending: Option<Vec<u8>>,
}

impl<R: BufRead> LineBuf<R> {
    pub fn new(inner: R) -> LineBuf<R> {
        LineBuf { inner, pending: None }
    }

    /// Read the next line. Returns `Ok(None)` at end of file. The trailing `\n` (and a
    /// preceding `\r`, if present) is stripped; embedded NUL bytes are left untouched.
    pub fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        self.read_raw()
    }

    /// Look at the next line without consuming it. A second call (with no intervening
    /// `read_line`) returns the same line again. Used by the history-file metadata parser to
    /// decide which section body a line belongs to before committing to reading it.
    pub fn peek_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.pending.is_none() {
            self.pending = self.read_raw()?;
        }
        Ok(self.pending.clone())
    }

    fn read_raw(&mut self) -> io::Result<Option<Vec<u8>>> {
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        if buf.last() == Some(&b'\n') {
            buf.pop();
            if buf.last() == Some(&b'\r') {
                buf.pop();
            }
        }
        Ok(Some(buf))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
