//! SCCS-compatible weave history engine.
//!
//! The three capability traits ([`capabilities::LineDiff`], [`capabilities::UserInfo`],
//! [`capabilities::MrValidator`]) are the seams an embedder customises; everything else here is
//! the fixed protocol of §4: checking files in, extracting revisions, recording deltas, and
//! reporting/validating history.

#[macro_use]
extern crate log;

pub use admin::Admin;
pub use capabilities::{
    EdHunk, EdOp, EnvUserInfo, LineDiff, MrValidator, NoMrValidator, ProcessLineDiff,
    ProcessMrValidator, UserInfo,
};
pub use config::EngineConfig;
pub use delta::{DeltaOptions, DeltaRecord, DeltaSummary};
pub use errors::{Error, Result};
pub use extract::{Extract, ExtractOptions, ExtractResult, ExtractedBody};
pub use pfile::{PEntry, PFile};
pub use report::{Cdc, Prs, Prt, Rmdel, Val, ValFinding};

pub use sccs_naming::{FileLock, HistoryName};
pub use sccs_weave::{
    Date, Delta, DeltaKind, DeltaTable, Flags, Header, HistoryCodec, PartialSid, SeqNo, Sid,
    SidRange,
};

mod admin;
mod binary;
mod capabilities;
mod config;
mod delta;
mod errors;
mod extract;
mod keyword;
mod pfile;
mod report;
