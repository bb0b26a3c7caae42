pub mod chain;
pub mod rpc;
pub mod notify;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use chain::*;
pub use rpc::*;
pub use notify::*;
