pub mod common;
pub mod entry;
pub mod form;
pub mod property;
pub mod state;
pub mod study;
pub mod user_context;

pub use common::*;
pub use entry::*;
pub use form::*;
pub use property::*;
pub use state::*;
pub use study::*;
pub use user_context::*;
