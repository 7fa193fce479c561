mod compliance;

pub use compliance::{CompliancePolicy, GroupingMode, RequiredPpePolicy, Subject};
