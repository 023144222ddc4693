//! 磁盘剩余空间检查

use std::path::Path;
use sysinfo::Disks;

use crate::application::ports::CacheError;

/// 缓存目录所在磁盘的剩余空间（字节）
///
/// 取挂载点是目录最长前缀的那个磁盘，找不到时返回 None
pub fn available_space(dir: &Path) -> Option<u64> {
    let dir = dir.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| dir.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

/// 剩余空间至少是缓存上限的两倍
pub fn check_free_space(dir: &Path, max_size_bytes: u64) -> Result<(), CacheError> {
    let required = max_size_bytes.saturating_mul(2);
    let Some(available) = available_space(dir) else {
        tracing::warn!(
            directory = %dir.display(),
            "Cannot determine free disk space for the cache directory, skipping the check"
        );
        return Ok(());
    };

    tracing::debug!(available, required, "Free disk space for the TTS cache");
    if available < required {
        return Err(CacheError::InsufficientSpace {
            available,
            required,
        });
    }
    Ok(())
}
