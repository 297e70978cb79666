//! Recursive size accounting / 目录大小统计

use super::RemoteStorage;
use crate::utils::join_path;

/// Total bytes of all files under `path` / 递归计算目录大小
///
/// Directories that cannot be listed count as zero, including `path` itself.
pub async fn folder_size(storage: &dyn RemoteStorage, path: &str) -> u64 {
    let mut pending = vec![path.to_string()];
    let mut total = 0u64;

    while let Some(dir) = pending.pop() {
        match storage.list(&dir).await {
            Ok(entries) => {
                for entry in entries {
                    if entry.is_dir {
                        pending.push(join_path(&dir, &entry.name));
                    } else {
                        total += entry.size;
                    }
                }
            }
            Err(e) => tracing::warn!("Error calculating size for {}: {}", dir, e),
        }
    }

    total
}
