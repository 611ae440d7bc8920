//! Interception core
//!
//! Everything that decides what happens to a paused exchange lives here:
//! the protocol adapter, session registry, paused-exchange store, the
//! engine tying them together and the output channel events leave through.

pub mod adapter;
pub mod body;
pub mod channel;
pub mod engine;
pub mod headers;
pub mod ids;
pub mod registry;
pub mod status;
pub mod store;

pub use adapter::{ProtocolAdapter, ProtocolEvent};
pub use channel::OutputChannel;
pub use engine::{Interceptor, Resolution};
pub use ids::{ChannelId, ExchangeId, TargetId};
pub use registry::{Registration, SessionRegistry, Teardown};
pub use store::{Direction, ExchangeStore, PausedExchange};
