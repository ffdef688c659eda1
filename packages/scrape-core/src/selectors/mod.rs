pub mod coerce;
pub mod extractor;
pub mod registry;

pub use coerce::{coerce_str, coerce_value, resolve_attribute_url};
pub use extractor::{extract, normalize_data, ExtractionOutcome};
pub use registry::{CandidateRegistry, CandidateRepository, SelectorHint};
