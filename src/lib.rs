pub mod broker;
pub mod protocol;
pub mod transport;
pub mod util;
pub mod test_util;
