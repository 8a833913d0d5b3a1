pub mod dispatch;
pub mod handler;
pub mod registry;
pub mod rooms;
pub mod signaling;
pub mod sweep;

pub use handler::{dispatch_client_message, websocket_handler};
pub use registry::{ConnectionRegistry, ConnectionSession};
pub use rooms::{CoordinatorStats, RoomCoordinator};
pub use sweep::spawn_cursor_sweep;
