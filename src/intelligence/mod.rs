pub mod canon;
pub mod engine;
pub mod patterns;
pub mod reference;
pub mod types;

pub use canon::{canonicalize, organ_system_for, same_test};
pub use engine::{assess_value, classify, RiskEngine};
pub use reference::{parse_reference_range, standard_bounds};
pub use types::*;
