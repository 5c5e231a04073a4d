//! Highlight rendering, overlap resolution, navigation and persistence
//! for the tidemark annotation engine.
//!
//! The engine is single-threaded and cooperatively scheduled: every tree
//! mutation, active-map change and navigation step happens on one logical
//! thread. Only the storage gateway, batch restore and view bringing
//! suspend. Hosts construct a [`session::Session`] with a document, a
//! conversation id, a key/value store and a clock; everything else hangs
//! off the session.

pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod navigation;
pub mod overlap;
pub mod record;
pub mod renderer;
pub mod session;
pub mod storage;
pub mod wrapper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use error::{EngineError, ErrorKind, FieldError};
pub use navigation::NavigationIndex;
pub use record::{HighlightRecord, Platform};
pub use renderer::{HighlightRenderer, RenderResult, RestoreResult};
pub use session::{Selection, Session, ViewBringer};
pub use storage::{
    HighlightFilter, KeyValueStore, MemoryStore, StorageGateway, StoreError, UpdatePatch,
    CURRENT_SCHEMA_VERSION,
};
pub use wrapper::{TextWrapper, WrapOutcome, WrappedElement};
