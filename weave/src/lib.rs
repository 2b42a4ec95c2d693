//! `sccs-weave` implements the SCCS history-file grammar: the `Sid`/`Date` value types, the
//! delta table, the checksummed on-disk codec, and the weave reconstruction engine
//! (`SeqState` + `WeaveReader`) that derives any single revision's text on demand from the
//! interleaved body, without ever materialising more than one revision's worth of lines at a
//! time.
//!
//! This crate is deliberately ignorant of file naming conventions (`sccs-naming`), locking,
//! keyword substitution, and the diff/splice machinery that turns an edited working copy into
//! a new delta — those live one layer up, in `sccs` itself, which composes this crate's
//! [`HistoryCodec`]/[`WeaveReader`] with `sccs-naming`'s file derivation and locking.

#![warn(bare_trait_objects)]

pub mod codec;
pub mod date;
pub mod delta;
pub mod errors;
pub mod flags;
pub mod header;
pub mod linebuf;
pub mod seqstate;
pub mod sid;
pub mod weave_reader;

pub use codec::{BodyCursor, BodyLine, Ctrl, HistoryCodec};
pub use date::Date;
pub use delta::{Delta, DeltaKind, DeltaTable, SeqSet};
pub use errors::{Error, Result};
pub use flags::{Flags, LockedReleases};
pub use header::Header;
pub use linebuf::LineBuf;
pub use seqstate::SeqState;
pub use sid::{PartialSid, SeqNo, Sid, SidRange};
pub use weave_reader::{WeaveEvent, WeaveReader, WeaveStats};
