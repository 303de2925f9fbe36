mod decode;
mod manager;
mod query;

pub use decode::{ColumnInfo, RawValue, Record, ScanKind, Value, coerce, decode_fields};
pub use manager::{ConnectionManager, TUNNEL_TRANSPORT};
pub use query::Param;
