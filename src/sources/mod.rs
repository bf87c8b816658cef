//! Session data sources: the backend and the in-memory synthetic stand-in.

pub mod remote;
pub mod synthetic;
pub mod traits;

pub use remote::RemoteSource;
pub use synthetic::SyntheticSource;
pub use traits::SessionSource;
