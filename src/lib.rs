pub mod config;
pub mod error;
pub mod messages;
pub mod presence;
pub mod registry;
pub mod relay;
pub mod room;
pub mod server;
pub mod session;
pub mod typing;

pub use config::Config;
pub use error::SessionError;
pub use messages::{ClientCommand, InboundFrame, Outbound, Reply, ServerEvent, Status, UserNotice};
pub use presence::{Outbox, Outboxes, PresenceBroadcaster};
pub use registry::{ConnectionEntry, ConnectionId, ConnectionRegistry};
pub use relay::{Message, MessageRelay};
pub use room::{Removal, Room, RoomStore, RoomSummary, User};
pub use server::Server;
pub use session::{InvariantViolation, SessionController};
pub use typing::{TypingTracker, TypingUser, DEFAULT_TYPING_TTL};
