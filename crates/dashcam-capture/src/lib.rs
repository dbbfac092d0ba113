pub mod capability;
pub mod capture_loop;
pub mod locator;
pub mod spool;

pub use capability::*;
pub use capture_loop::*;
pub use locator::*;
pub use spool::*;
