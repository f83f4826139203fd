pub mod convert;
pub mod fields;
pub mod season;
pub mod tracking;

pub use fields::{FieldNormalizer, NormalizeOptions, RuleTables};
pub use season::canonical_season_type;
