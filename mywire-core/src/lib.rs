//! Core of mywire, the async MySQL wire protocol client.
//!
//! This crate holds the plumbing that does not depend on MySQL itself: the error type,
//! buffer extension traits, the buffered socket, runtime shims and statement logging.
//! Use the `mywire` facade instead of depending on this crate directly.
#![warn(future_incompatible, rust_2018_idioms)]
#![allow(clippy::needless_doctest_main, clippy::type_complexity)]
#![deny(unsafe_code)]

#[macro_use]
pub mod error;

pub mod io;
pub mod logger;
pub mod net;
pub mod rt;

pub use error::{BoxDynError, DatabaseError, Error, Result};
pub use logger::LogSettings;

/// External crates the member crates reach through this one.
#[doc(hidden)]
pub mod ext {
    pub use bytes;
    pub use futures_core;
    pub use futures_util;
}
