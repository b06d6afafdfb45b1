//! Values, rows and tokens exchanged with the table store.

mod continuation;
mod row;
mod value;

pub use continuation::ContinuationToken;
pub use row::{ANY_ETAG, PropertyBag, TableRow};
pub use value::{MemberType, Value};
