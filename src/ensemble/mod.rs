//! Ensemble methods module
//!
//! Ranks the trained battery and combines the leaders into a soft-voting
//! ensemble.

mod voting;

pub use voting::{select_top_models, SoftVotingEnsemble};
