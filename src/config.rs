//! Process-global, read-only-after-construction configuration (§5 "Shared resources", §9
//! "Global configuration"). Built once and passed by reference into `Admin`, `Extract`, and
//! `DeltaRecord`; never re-read per call.

use std::env;

/// The default cap on a single body line's length before text insertion gives up and falls
/// back to the uuencoded binary representation (§4.6).
pub const DEFAULT_MAX_SFILE_LINE_LEN: usize = 4096 - 64;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Used only in diagnostic text the caller chooses to surface; the engine itself never
    /// prints anything.
    pub program_name: String,
    pub max_sfile_line_len: usize,
    pub binary_file_creation_allowed: bool,
}

impl EngineConfig {
    pub fn new(program_name: impl Into<String>) -> EngineConfig {
        EngineConfig {
            program_name: program_name.into(),
            max_sfile_line_len: DEFAULT_MAX_SFILE_LINE_LEN,
            binary_file_creation_allowed: true,
        }
    }

    /// Read the handful of environment-derived limits the classical tool takes from its
    /// environment at startup (`SCCS_MAX_LINE`, `SCCS_NO_BINARY`). Looked up once, here; §9
    /// forbids re-reading the environment per call, so nothing in the engine itself ever calls
    /// `env::var` again after this constructor runs.
    pub fn from_env(program_name: impl Into<String>) -> EngineConfig {
        let mut cfg = EngineConfig::new(program_name);
        if let Ok(v) = env::var("SCCS_MAX_LINE") {
            if let Ok(n) = v.parse() {
                cfg.max_sfile_line_len = n;
            }
        }
        if env::var("SCCS_NO_BINARY").is_ok() {
            cfg.binary_file_creation_allowed = false;
        }
        cfg
    }
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig::new("sccs")
    }
}
