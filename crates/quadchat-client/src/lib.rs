// Embeddable secure-chat engine: session protocol, view model, and the
// command/event API a UI shell drives.

pub mod engine;
pub mod error;
pub mod events;
pub mod files;
pub mod session;
pub mod state;
pub mod transcript;

pub use engine::{spawn_chat, ChatConfig, ChatHandle, ChatSnapshot};
pub use error::ChatError;
pub use events::{ChatEvent, ErrorKind, ErrorNotice};
pub use transcript::{ChatMessage, MessageOrigin, ResourceCatalog, SharedResource, Transcript};
