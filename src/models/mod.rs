pub mod probe;
pub mod record;

pub use probe::*;
pub use record::*;
