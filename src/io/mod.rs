mod envelope;
mod export;

pub use envelope::*;
pub use export::*;
