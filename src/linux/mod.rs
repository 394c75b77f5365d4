pub mod errors;
pub mod locator;
pub mod memory;
pub mod process;
pub mod signature;
pub mod worker;

pub type Pid = i32;
