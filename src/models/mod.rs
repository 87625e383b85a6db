pub mod index;
pub mod mask;
pub mod session;

pub use index::{IndexEntry, SessionIndex, INDEX_VERSION};
pub use mask::{ActivityMask, BitMaskRecord};
pub use session::{
    NewSession, Session, SessionFilter, SessionKind, SessionStatus, DEFAULT_INTERVAL_MINUTES,
};
