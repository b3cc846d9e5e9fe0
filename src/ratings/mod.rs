mod rubric;
mod types;

pub use rubric::RubricDefinition;
pub use types::*;
