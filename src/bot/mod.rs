//! Bot module - routes inbound chat-network messages to command handlers.

pub mod dispatch;
pub mod engine;
pub mod gateway;
pub mod message;
pub mod prayer;
pub mod state;
pub mod store;
pub mod supervisor;
pub mod transport;


pub use engine::BotEngine;
pub use gateway::GatewayClient;
pub use message::{InboundMessage, StoredMessage};
pub use supervisor::ConnectionSupervisor;
pub use transport::{SessionEvent, Transport};
