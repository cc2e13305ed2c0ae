mod frame;
pub use frame::*;

mod object;
pub use object::*;

mod kind;
pub use kind::*;

mod timestamp;
pub use timestamp::*;

/// Caller supplied key/value attributes attached to a metadata record
pub type Attributes = serde_json::Map<String, serde_json::Value>;
