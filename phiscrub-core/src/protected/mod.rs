// phiscrub-core/src/protected/mod.rs
//! Protected clinical vocabulary: the index built from configuration and the
//! veto engine that consults it.

pub mod index;
pub mod veto;

pub use index::ProtectedTermIndex;
pub use veto::{evaluate, veto, VetoContext, VetoReason, VetoRule, VETO_RULES};
