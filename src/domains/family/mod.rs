pub mod entitlement;
pub mod repository;
pub mod types;

#[cfg(test)]
pub mod fixtures;

pub use entitlement::{ExportEntitlement, PlanTierEntitlement};
pub use repository::{FamilyContentRepository, FamilyRepository, SqliteFamilyRepository};
pub use types::{ContentKind, Family};
