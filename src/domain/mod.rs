mod account;
mod integrity;
mod money;
mod operation;
mod settlement;
mod transaction;

pub use account::*;
pub use integrity::*;
pub use money::*;
pub use operation::*;
pub use settlement::*;
pub use transaction::*;
