// ckv-common - Wire contract shared by the ClusterKV client crates
//
// This crate defines the message code table, frame layout, protobuf payloads
// and the response codec.

pub mod codec;
pub mod codes;
pub mod error;
pub mod frame;
pub mod messages;

// Re-export for convenience
pub use codec::*;
pub use codes::*;
pub use error::*;
pub use frame::*;
pub use messages::*;
