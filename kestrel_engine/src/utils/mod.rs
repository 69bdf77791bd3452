mod or_log;
pub use or_log::*;

mod casemap;
pub use casemap::*;
