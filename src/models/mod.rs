pub mod pool;
pub mod proxy;
pub mod report;
pub mod request;

pub use pool::*;
pub use proxy::*;
pub use report::*;
pub use request::*;
