pub mod bedpe;
pub mod command;
pub mod fastx;
pub mod file;
pub mod system;
