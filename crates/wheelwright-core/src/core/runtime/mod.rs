pub mod effects;
pub mod net;
pub mod process;
