// Safety classification - decides whether a device may be destroyed.
//
// A device is vetoed when it backs the running operating system (root or
// boot filesystem) or carries a mounted critical path. The check fails safe:
// if mount state cannot be resolved, the device is treated as a system drive.

pub mod mounts;

#[cfg(test)]
mod safety_tests;

pub use mounts::{MountEntry, MountSource, ProcMounts, StaticMounts};

use crate::{WipeError, WipeResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Mountpoints that veto a wipe when they live on the target device.
pub const CRITICAL_MOUNTPOINTS: [&str; 5] = ["/", "/boot", "/usr", "/var", "/etc"];

/// Mountpoint prefixes recorded as user data but not vetoing on their own.
pub const USER_DATA_ROOTS: [&str; 3] = ["/home", "/media", "/mnt"];

lazy_static! {
    // nvme0n1p2, mmcblk0p1: a digit-terminated parent plus a pN suffix
    static ref P_SUFFIX: Regex = Regex::new(r"^(?P<base>.*\d)p\d+$").unwrap();
    // sda1, vdb3, xvda2: all-letter parent plus a numeric suffix
    static ref NUM_SUFFIX: Regex = Regex::new(r"^(?P<base>[a-z]+)\d+$").unwrap();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyVerdict {
    pub device: String,
    pub is_system_drive: bool,
    pub has_mounted_system_path: bool,
    pub mounted_user_paths: Vec<String>,
    pub reasons: Vec<String>,
    pub safe: bool,
}

impl SafetyVerdict {
    fn resolve(
        device: String,
        is_system_drive: bool,
        has_mounted_system_path: bool,
        mounted_user_paths: Vec<String>,
        reasons: Vec<String>,
    ) -> Self {
        let safe = !(is_system_drive || has_mounted_system_path);
        Self {
            device,
            is_system_drive,
            has_mounted_system_path,
            mounted_user_paths,
            reasons,
            safe,
        }
    }

    /// Verdict used when safety cannot be proven: treated as a system drive.
    fn fail_safe(device: &Path, error: &WipeError) -> Self {
        Self::resolve(
            device.display().to_string(),
            true,
            false,
            Vec::new(),
            vec![format!("cannot verify device safety: {}", error)],
        )
    }
}

/// Normalize a device name to its base (whole-disk) identifier so that
/// `/dev/sda` and `/dev/sda1` compare equal.
///
/// Prefers the kernel's own answer (`/sys/class/block/<name>/partition`);
/// falls back to name syntax when sysfs does not know the device.
pub fn base_device_name(name: &str) -> String {
    let name = name.trim_start_matches("/dev/");

    let partition_marker = format!("/sys/class/block/{}/partition", name);
    if Path::new(&partition_marker).exists() {
        if let Ok(resolved) = fs::canonicalize(format!("/sys/class/block/{}", name)) {
            if let Some(parent) = resolved.parent().and_then(|p| p.file_name()) {
                return parent.to_string_lossy().to_string();
            }
        }
    }

    if let Some(caps) = P_SUFFIX.captures(name) {
        return caps["base"].to_string();
    }
    if let Some(caps) = NUM_SUFFIX.captures(name) {
        return caps["base"].to_string();
    }
    name.to_string()
}

/// Resolve a device name to the set of physical base devices behind it,
/// walking /sys/block/<name>/slaves through device-mapper, LVM and md
/// layers. A plain partition or disk resolves to its own base name.
pub fn physical_base_devices(name: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_physical(name.trim_start_matches("/dev/"), &mut out, 0);
    out
}

fn collect_physical(name: &str, out: &mut BTreeSet<String>, depth: usize) {
    // A dm stack deeper than this is not a real system
    if depth > 8 {
        out.insert(base_device_name(name));
        return;
    }

    let base = base_device_name(name);
    let slaves_dir = format!("/sys/block/{}/slaves", base);
    match fs::read_dir(&slaves_dir) {
        Ok(entries) => {
            let slaves: Vec<String> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect();
            if slaves.is_empty() {
                out.insert(base);
            } else {
                for slave in slaves {
                    collect_physical(&slave, out, depth + 1);
                }
            }
        }
        Err(_) => {
            out.insert(base);
        }
    }
}

/// Resolve symlinked device paths (/dev/mapper/*, /dev/disk/by-*) to their
/// canonical node, keeping the original on failure.
fn canonical_device(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

pub struct SafetyClassifier {
    mounts: Arc<dyn MountSource>,
}

impl SafetyClassifier {
    pub fn new(mounts: Arc<dyn MountSource>) -> Self {
        Self { mounts }
    }

    /// Classifier reading the live system mount table.
    pub fn system_default() -> Self {
        Self::new(Arc::new(ProcMounts))
    }

    /// Classify a device. Computed fresh on every call; mount state can
    /// change between wipe requests, so verdicts are never cached.
    pub fn classify(&self, device: &Path) -> SafetyVerdict {
        match self.classify_inner(device) {
            Ok(verdict) => verdict,
            Err(e) => SafetyVerdict::fail_safe(device, &e),
        }
    }

    fn classify_inner(&self, device: &Path) -> WipeResult<SafetyVerdict> {
        let target_name = canonical_device(device)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| WipeError::unavailable(device, "not a device path"))?;
        let target_bases = physical_base_devices(&target_name);

        let entries = self.mounts.entries()?;

        let mut is_system_drive = false;
        let mut has_mounted_system_path = false;
        let mut mounted_user_paths = Vec::new();
        let mut reasons = Vec::new();

        // Root filesystem must be resolvable; anything else fails safe.
        let root_device = backing_device(&entries, "/").ok_or_else(|| {
            WipeError::MountTable("cannot resolve the root filesystem device".to_string())
        })?;
        if overlaps(&target_bases, &root_device) {
            is_system_drive = true;
            reasons.push(format!(
                "device {} contains the root filesystem ({})",
                device.display(),
                root_device
            ));
        }

        // A separate /boot may or may not exist; absence is not an error.
        if let Some(boot_device) = backing_device(&entries, "/boot") {
            if overlaps(&target_bases, &boot_device) {
                is_system_drive = true;
                reasons.push(format!(
                    "device {} contains the boot partition ({})",
                    device.display(),
                    boot_device
                ));
            }
        }

        // Anything currently mounted from the target device.
        for entry in &entries {
            if !entry.device.starts_with("/dev/") {
                continue;
            }
            let entry_base =
                base_device_name(&canonical_device(Path::new(&entry.device)).to_string_lossy());
            if !target_bases.contains(&entry_base) {
                continue;
            }

            if CRITICAL_MOUNTPOINTS.contains(&entry.mountpoint.as_str()) {
                has_mounted_system_path = true;
                reasons.push(format!(
                    "system mount: {} mounted at {}",
                    entry.device, entry.mountpoint
                ));
            } else if USER_DATA_ROOTS
                .iter()
                .any(|root| entry.mountpoint.starts_with(root))
            {
                mounted_user_paths.push(entry.mountpoint.clone());
                reasons.push(format!(
                    "user data: {} mounted at {}",
                    entry.device, entry.mountpoint
                ));
            }
        }

        Ok(SafetyVerdict::resolve(
            device.display().to_string(),
            is_system_drive,
            has_mounted_system_path,
            mounted_user_paths,
            reasons,
        ))
    }
}

/// Device backing a mountpoint, if the mount table lists one.
fn backing_device(entries: &[MountEntry], mountpoint: &str) -> Option<String> {
    entries
        .iter()
        .find(|e| e.mountpoint == mountpoint && e.device.starts_with("/dev/"))
        .map(|e| e.device.clone())
}

/// Does the device (after symlink and dm/LVM resolution) share a physical
/// base device with the target?
fn overlaps(target_bases: &BTreeSet<String>, device: &str) -> bool {
    let resolved = canonical_device(Path::new(device));
    let name = resolved.file_name().map(|n| n.to_string_lossy().to_string());
    match name {
        Some(name) => physical_base_devices(&name)
            .iter()
            .any(|base| target_bases.contains(base)),
        None => false,
    }
}
