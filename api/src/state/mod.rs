mod epoch;
mod action;
mod policy;

pub use epoch::*;
pub use action::*;
pub use policy::*;
