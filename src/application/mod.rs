// Application layer - ledger operations on top of the storage traits

mod balance;
pub mod error;
mod locks;
mod lookup;
mod service;

pub use balance::*;
pub use error::*;
pub use locks::*;
pub use lookup::*;
pub use service::*;
