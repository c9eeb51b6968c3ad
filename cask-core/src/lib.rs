pub mod bundle;
pub mod error;
pub mod localize;
pub mod manifest;
pub mod media;
pub mod preview;
pub mod progress;
pub mod session;
pub mod store;
pub mod walk;

pub use error::{CaskError, Result};
