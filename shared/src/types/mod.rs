//! Data types exchanged between the presence source and the ledger

pub mod presence;
pub mod record;
