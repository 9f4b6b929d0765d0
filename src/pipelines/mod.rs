pub mod align;
pub mod chipseq;
pub mod coverage;
pub mod layout;
pub mod postprocess;
