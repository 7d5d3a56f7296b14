pub mod synthetic;
pub mod types;

pub use synthetic::{SyntheticConfig, SyntheticGenerator};
pub use types::{validate_snapshots, DataError, MarketSnapshot, OptionType};
