// Application layer - use cases and orchestration
// The service owns the repository and the settlement engine; clients (the CLI,
// tests) only talk to `LedgerService`.

pub mod error;
mod service;
mod settlement;

pub use error::*;
pub use service::*;
pub use settlement::*;
