pub mod checksum;
pub mod clock;
pub mod error;
pub mod filename;
pub mod fs;
pub mod gallery;
pub mod health;
pub mod precision;
pub mod session;
pub mod types;

pub use checksum::*;
pub use clock::*;
pub use error::*;
pub use filename::*;
pub use fs::*;
pub use gallery::*;
pub use health::*;
pub use precision::*;
pub use session::*;
pub use types::*;
