pub mod peer;
pub mod stream;
pub mod transport;
