//! External opinion intake and final risk aggregation.

mod aggregate;
mod opinion;

pub use aggregate::{
    Contribution, ContributionCombine, EvidenceClass, RiskAggregator,
    RiskAssessment, RiskConfig, RiskInputs, Verdict, VerdictBands,
};
pub use opinion::{AdulterationFlag, ExternalOpinion, OpinionProvider, OpinionRequest};
