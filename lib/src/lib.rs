//! Decoders for X-Ray Engine skeletal meshes (OGF) and level files.

pub mod convert;
pub mod error;
pub mod format;
pub mod session;
pub mod skeleton;
pub mod util;
pub mod way;

pub use error::{Error, Result};
