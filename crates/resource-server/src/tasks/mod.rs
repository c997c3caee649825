//! Background tasks.

pub mod key_refresh;

pub use key_refresh::start_key_refresher;
