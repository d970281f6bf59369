pub mod conflict;
pub mod event;
pub mod messages;
pub mod operation;
pub mod participant;
pub mod presence;
pub mod session;

pub use conflict::{ConflictRecord, ConflictResolution, ConflictStrategy};
pub use event::{ChatMessage, EventPayload, SessionEvent};
pub use messages::WireMessage;
pub use operation::{Operation, OperationKind};
pub use participant::{Participant, ParticipantRole, PresenceStatus};
pub use presence::{CursorPosition, PresenceInfo, PresencePatch, SelectionRange, Viewport};
pub use session::{ConflictResolutionMode, Session, SessionOptions, SessionPermissions, SessionSettings};
