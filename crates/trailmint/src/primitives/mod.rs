mod epoch;
mod object;

pub use epoch::Epoch;
pub use object::{ObjectDigest, ObjectId, ObjectRef, ParseObjectError};
pub(crate) use object::parse_hex32;
