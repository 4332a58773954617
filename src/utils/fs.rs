use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::error::PatchError;

/// 写回配置文件, 尽量原子替换
///
/// 先解析符号链接, 临时文件放在真实目标所在目录, fsync 后 rename 覆盖。
/// 目标已存在时沿用其权限位和属主。任何一步失败 (目录不可写、跨设备、
/// 单文件 bind mount 的 EBUSY、无法 chown 等) 都退回原地截断写入。
pub fn write_atomic<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<(), PatchError> {
    let path = path.as_ref();
    let target = match fs::canonicalize(path) {
        Ok(resolved) => resolved,
        // 悬空符号链接: 穿透写入, 由系统创建链接指向的文件
        Err(_) if is_symlink(path) => return write_in_place(path, data),
        Err(_) => path.to_path_buf(),
    };
    let tmp = temp_path_for(&target);

    match write_then_rename(&tmp, &target, data) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::remove_file(&tmp);
            debug!("无法原子替换, 改为原地写入: {}", e);
            write_in_place(&target, data)
        }
    }
}

fn write_then_rename(tmp: &Path, target: &Path, data: &[u8]) -> Result<(), PatchError> {
    let mut f = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(tmp)
        .map_err(|e| PatchError::io(tmp, e))?;
    f.write_all(data).map_err(|e| PatchError::io(tmp, e))?;
    f.sync_all().map_err(|e| PatchError::io(tmp, e))?;
    drop(f);

    if let Ok(meta) = fs::metadata(target) {
        fs::set_permissions(tmp, meta.permissions()).map_err(|e| PatchError::io(tmp, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            std::os::unix::fs::chown(tmp, Some(meta.uid()), Some(meta.gid()))
                .map_err(|e| PatchError::io(tmp, e))?;
        }
    }

    fs::rename(tmp, target).map_err(|e| PatchError::io(target, e))
}

fn write_in_place(path: &Path, data: &[u8]) -> Result<(), PatchError> {
    fs::write(path, data).map_err(|e| PatchError::io(path, e))
}

fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_symlink())
        .unwrap_or(false)
}

fn temp_path_for(path: &Path) -> PathBuf {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "config".to_string());

    dir.join(format!(".{}.{}.tmp", name, std::process::id()))
}
