//! Domain models shared by both store backends.

pub mod event;
pub mod response;

pub use self::event::*;
pub use self::response::*;
