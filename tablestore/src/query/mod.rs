//! Store-native filters and translation of member conditions into them.

mod filter;
mod translate;

pub use filter::{CompareOp, Filter};
pub use translate::{Condition, TranslatedQuery, translate};
