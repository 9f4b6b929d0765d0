pub mod defs;
pub mod resolve;
