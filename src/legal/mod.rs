//! Matter dataset, retrieval and the conflict-check domain.

pub mod audit;
pub mod conflicts;
pub mod dataset;
pub mod index;
pub mod prompt;
pub mod render;
pub mod response;
pub mod retrieval;
