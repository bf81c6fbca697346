pub mod config;
pub mod discovery;
pub mod ids;
pub mod message;
pub mod msgpack;
pub mod node;
pub mod sockaddr;
pub mod value;

pub use config::{DiscoveryConfig, DEFAULT_PORT};
pub use discovery::{
    NodeAdvert, PeerDiscovery, ServiceDiscoveredCallback, MULTICAST_ADDR_V4, MULTICAST_ADDR_V6,
};
pub use ids::InfoHash;
pub use message::{
    MessageError, MessageType, ParsedMessage, AF_INET, AF_INET6, CREATED_UNSET, WANT4, WANT6,
};
pub use node::{pack_nodes4, pack_nodes6, unpack_nodes4, unpack_nodes6, Node, NODE4_LEN, NODE6_LEN};
pub use sockaddr::{Family, SockAddr};
pub use value::{
    FieldValue, FieldValueIndex, QueryFilter, Value, ValueError, ValueField, MAX_VALUE_SIZE,
};

#[cfg(test)]
mod conformance;
