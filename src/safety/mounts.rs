// Mount table enumeration behind a trait so classification can be tested
// against a synthetic table.

use crate::{WipeError, WipeResult};

/// One row of the system mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Backing device as listed in the table, e.g. `/dev/sda1`
    pub device: String,
    /// Mount point, e.g. `/` or `/home`
    pub mountpoint: String,
    /// Filesystem type, e.g. `ext4`
    pub fs_type: String,
}

pub trait MountSource: Send + Sync {
    /// A fresh snapshot of the current mount table. Never cached by callers;
    /// mount state can change between wipe requests.
    fn entries(&self) -> WipeResult<Vec<MountEntry>>;
}

/// Live mount table read from /proc/mounts.
#[derive(Debug, Default)]
pub struct ProcMounts;

impl MountSource for ProcMounts {
    fn entries(&self) -> WipeResult<Vec<MountEntry>> {
        let mounts =
            procfs::mounts().map_err(|e| WipeError::MountTable(format!("/proc/mounts: {}", e)))?;

        Ok(mounts
            .into_iter()
            .map(|m| MountEntry {
                device: m.fs_spec,
                mountpoint: m.fs_file,
                fs_type: m.fs_vfstype,
            })
            .collect())
    }
}

/// Fixed mount table for tests and dry runs.
#[derive(Debug, Default)]
pub struct StaticMounts {
    entries: Vec<MountEntry>,
}

impl StaticMounts {
    pub fn new(entries: Vec<MountEntry>) -> Self {
        Self { entries }
    }

    pub fn entry(device: &str, mountpoint: &str, fs_type: &str) -> MountEntry {
        MountEntry {
            device: device.to_string(),
            mountpoint: mountpoint.to_string(),
            fs_type: fs_type.to_string(),
        }
    }
}

impl MountSource for StaticMounts {
    fn entries(&self) -> WipeResult<Vec<MountEntry>> {
        Ok(self.entries.clone())
    }
}

/// Mount source that always fails, for exercising the fail-safe path.
#[derive(Debug, Default)]
pub struct UnreadableMounts;

impl MountSource for UnreadableMounts {
    fn entries(&self) -> WipeResult<Vec<MountEntry>> {
        Err(WipeError::MountTable("mount table unreadable".to_string()))
    }
}
