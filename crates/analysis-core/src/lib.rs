pub mod error;
pub mod retry;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::*;
pub use retry::RetryPolicy;
pub use traits::*;
pub use types::*;
