//! The metadata that precedes a history file's body: the delta table, the
//! users list, the flags, and the free-form description comments.

use crate::delta::DeltaTable;
use crate::flags::Flags;

/// Everything in a history file except the checksum and the body itself.
///
/// [`crate::codec::HistoryCodec::read`] materialises this fully before handing back a
/// [`crate::codec::BodyCursor`] positioned at the start of the body, so that callers never
/// need to re-scan the metadata section just to answer "what deltas exist" or "what are the
/// flags".
#[derive(Clone, Debug, Default)]
pub struct Header {
    pub delta_table: DeltaTable,
    pub users: Vec<String>,
    pub flags: Flags,
    pub comments: Vec<String>,
}

impl Header {
    pub fn new() -> Header {
        Header::default()
    }
}
