//! Tagged `Outcome` (spec §9 "exceptions as control flow → tagged Outcome"):
//! every engine runner returns this instead of throwing.

use serde_json::Value;

use crate::error::PipelineError;

pub struct EngineSuccess {
    pub data: Value,
    pub html: Option<String>,
    /// Only the `browser` tier populates these (spec §4.12, §9 artifacts).
    pub screenshot: Option<Vec<u8>>,
    pub har: Option<Vec<u8>>,
}

pub type EngineOutcome = Result<EngineSuccess, PipelineError>;
