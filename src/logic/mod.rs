pub mod converter;
pub mod directory;
pub mod entity_ops;
pub mod lookup;
pub mod registry;
pub mod search_index;
pub mod state_machine;
pub mod unify;
pub mod validate;

pub use converter::*;
pub use directory::*;
pub use entity_ops::*;
pub use lookup::*;
pub use registry::*;
pub use search_index::*;
pub use state_machine::*;
pub use unify::*;
pub use validate::*;
