pub mod api;
pub mod ledger;

pub use ledger::*;
