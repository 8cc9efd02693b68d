//! Request-scoped analysis pipeline.
//!
//! This is the glue layer: it wires the stages in data-flow order and owns no
//! algorithm of its own. Algorithms live in `crate::code`, `crate::glyph`,
//! `crate::engraving`, `crate::anomaly` and `crate::risk`.

mod result;
mod run;

pub use result::{Analysis, AnalysisReport};
pub use run::InspectionRequest;

pub(crate) use run::{run, Stages};
