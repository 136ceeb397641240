//! Binary wire protocol
//!
//! Operations travel between replicas as Protocol Buffer messages, one
//! message per operation. The transport is responsible for delivering each
//! site's operations in the order that site produced them.

pub mod messages;
pub mod serialize;

pub use messages::*;
pub use serialize::{
    decode_message, deserialize_operation, encode_message, operation_from_message,
    operation_to_message, serialize_operation,
};
