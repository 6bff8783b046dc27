//! Collaborator traits consumed by the upload engine.
//!
//! The engine owns scheduling, durability, and resumption; everything that
//! touches the platform (media library, format conversion, the remote
//! backend, background-execution budgets, progress observers) is injected
//! through these seams.

pub mod activity;
pub mod assets;
pub mod background;
pub mod export;
pub mod session;

pub use activity::{ActivitySink, LogActivitySink};
pub use assets::AssetResolver;
pub use background::{BackgroundExecution, BackgroundGrant, UnboundedExecution};
pub use export::MediaExporter;
pub use session::{AccountSession, SessionProvider};
