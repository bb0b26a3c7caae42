pub mod consts;
pub mod error;
pub mod balance;
pub mod state;

pub mod prelude {
    pub use crate::consts::*;
    pub use crate::error::*;
    pub use crate::balance::*;
    pub use crate::state::*;
}
