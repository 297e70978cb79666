mod driver;

pub use driver::{SftpConnectConfig, SftpStorage};
