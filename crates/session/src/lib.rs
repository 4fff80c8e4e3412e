//! Remote-site sessions.
//!
//! Defines the capability the uploader drives ([`Session`]) and the models it
//! is expressed in. No transport is bundled: hosting-site clients implement
//! [`Session`] and [`SessionFactory`].

pub mod error;
mod models;
mod progress;
pub mod session;

pub use crate::models::{Site, UploadItem, User};
pub use crate::progress::Progress;
pub use crate::session::{Session, SessionFactory, SessionHandle};
#[cfg(feature = "mock")]
pub use crate::session::{MockSession, MockSessionFactory};
