mod account;
mod ledger;
mod money;
mod statement;

pub use account::*;
pub use ledger::*;
pub use money::*;
pub use statement::*;
