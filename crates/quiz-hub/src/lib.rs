pub mod client;
pub mod connection;
pub mod error;
pub mod hub;
pub mod protocol;
pub mod shard;
pub mod stats;
pub mod ticket;

pub use client::{ClientHandle, CloseSignal};
pub use error::HubError;
pub use hub::Hub;
pub use protocol::{close_code, ClientMessage, QuestionOptionWire, ServerMessage};
pub use stats::{HubStats, ShardStats, ShardStatsSnapshot};
pub use ticket::{InMemoryTicketStore, Ticket, TicketStore};
