// Block device helpers: size queries and /sys/block enumeration.

use crate::{WipeError, WipeResult};
use std::fs;
use std::os::fd::AsRawFd;
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};

// BLKGETSIZE64 from <linux/fs.h>: _IOR(0x12, 114, size_t)
const BLKGETSIZE64: libc::c_ulong = 0x8008_1272;

/// A block device discovered under /sys/block.
#[derive(Debug, Clone)]
pub struct BlockDevice {
    pub name: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub model: Option<String>,
}

/// Size of a wipe target in bytes.
///
/// Block devices report zero through `metadata().len()`, so they go through
/// the BLKGETSIZE64 ioctl; regular files use their metadata length.
pub fn probe_size(path: &Path) -> WipeResult<u64> {
    let metadata = fs::metadata(path)
        .map_err(|e| WipeError::unavailable(path, format!("cannot stat: {}", e)))?;

    if metadata.file_type().is_block_device() {
        return block_device_size(path);
    }

    Ok(metadata.len())
}

fn block_device_size(path: &Path) -> WipeResult<u64> {
    let file = fs::File::open(path)
        .map_err(|e| WipeError::unavailable(path, format!("cannot open: {}", e)))?;

    let mut size: u64 = 0;
    let rc = unsafe { libc::ioctl(file.as_raw_fd(), BLKGETSIZE64, &mut size) };
    if rc != 0 {
        return Err(WipeError::unavailable(
            path,
            format!("BLKGETSIZE64 failed: {}", std::io::Error::last_os_error()),
        ));
    }

    Ok(size)
}

/// Check if device should be skipped during enumeration
pub fn should_skip_device(device_name: &str) -> bool {
    // Skip loop devices, ram disks, device mapper, etc.
    device_name.starts_with("loop")
        || device_name.starts_with("ram")
        || device_name.starts_with("dm-")
        || device_name.starts_with("sr") // CD/DVD drives
        || device_name.starts_with("zram")
}

/// Enumerate physical block devices from /sys/block.
pub fn list_block_devices() -> WipeResult<Vec<BlockDevice>> {
    let entries = fs::read_dir("/sys/block")
        .map_err(|e| WipeError::Internal(format!("cannot read /sys/block: {}", e)))?;

    let mut devices = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| WipeError::Internal(e.to_string()))?;
        let name = entry.file_name().to_string_lossy().to_string();

        if should_skip_device(&name) {
            continue;
        }

        let path = PathBuf::from(format!("/dev/{}", name));
        if !path.exists() {
            continue;
        }

        let size_bytes = match probe_size(&path) {
            Ok(size) => size,
            Err(e) => {
                log::warn!("skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let model = fs::read_to_string(format!("/sys/block/{}/device/model", name))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        devices.push(BlockDevice {
            name,
            path,
            size_bytes,
            model,
        });
    }

    devices.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(devices)
}
