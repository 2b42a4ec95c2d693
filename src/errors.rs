//! The engine's error sum type (§7): every fallible operation returns a `Failure` carrying a
//! category-and-code pair, composed from the lower layers' own error enums via `#[from]`
//! rather than being re-wrapped as strings.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no delta matches the requested Sid")]
    SidNotFound,

    #[error("an MR is required but none was supplied")]
    MrRequired,

    #[error("MR {mr:?} rejected by validator: {detail}")]
    MrRejected { mr: String, detail: String },

    #[error("invalid value for flag -{letter}: {value}")]
    InvalidFlagValue { letter: char, value: String },

    #[error("{0}")]
    NoAuthorisation(String),

    #[error("no checkout entry in the p-file matches this claim")]
    NoSuchCheckout,

    #[error("delta {0} is not a leaf; only the tip of a branch may be removed")]
    NotALeaf(u32),

    #[error("p-file entry for Sid {0} already exists")]
    DuplicateCheckout(String),

    #[error("release {0} is locked against further deltas")]
    ReleaseLocked(u32),

    #[error("release {0} is above the file's ceiling")]
    AboveCeiling(u32),

    #[error("release {0} is below the file's floor")]
    BelowFloor(u32),

    #[error("the i flag requires at least one recognised keyword in the new text")]
    NoIdKeywords,

    #[error("Sid {0} is already checked out for edit and the j flag is not set")]
    AlreadyBeingEdited(sccs_weave::Sid),

    #[error("a new branch is required but the b flag is not set")]
    BranchingNotAllowed,

    #[error(transparent)]
    Weave(#[from] sccs_weave::Error),

    #[error(transparent)]
    Naming(#[from] sccs_naming::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
