pub mod event;
pub mod session;

pub use event::{ErrorDetail, ErrorKind, Event, PointerTarget, Rect, Viewport};
pub use session::{
    session_key, ContextSnapshot, SessionData, SessionEntry, SessionStart, SessionStatus,
    STATUS_KEY,
};
