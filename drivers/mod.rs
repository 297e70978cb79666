// Driver package / 驱动包
pub mod sftp;

pub use sftp::{SftpConnectConfig, SftpStorage};
