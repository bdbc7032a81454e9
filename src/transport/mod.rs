//! Client transport
//!
//! Players talk to the engine over WebSocket text frames carrying JSON. This
//! module decodes those frames, routes them to the engine, writes outcomes
//! back, and serves the read-only queue API next to the socket endpoint.

pub mod handler;
pub mod http;
pub mod messages;
pub mod websocket;

pub use handler::{dispatch_frame, EngineMessageHandler, MessageHandler};
pub use http::{GatewayConfig, GatewayServer, GatewayState};
pub use messages::{parse_inbound, InboundEvent};
