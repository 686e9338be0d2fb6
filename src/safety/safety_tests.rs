use super::mounts::{StaticMounts, UnreadableMounts};
use super::*;
use test_case::test_case;

fn classifier_with(entries: Vec<MountEntry>) -> SafetyClassifier {
    SafetyClassifier::new(Arc::new(StaticMounts::new(entries)))
}

fn linux_like_table() -> Vec<MountEntry> {
    vec![
        StaticMounts::entry("/dev/vda1", "/", "ext4"),
        StaticMounts::entry("/dev/vda2", "/boot", "ext4"),
        StaticMounts::entry("proc", "/proc", "proc"),
        StaticMounts::entry("tmpfs", "/tmp", "tmpfs"),
    ]
}

#[test_case("sda1", "sda" ; "sata partition")]
#[test_case("vdb3", "vdb" ; "virtio partition")]
#[test_case("xvda2", "xvda" ; "xen partition")]
#[test_case("nvme0n1p2", "nvme0n1" ; "nvme partition")]
#[test_case("mmcblk0p1", "mmcblk0" ; "emmc partition")]
#[test_case("nvme0n1", "nvme0n1" ; "nvme whole device untouched")]
#[test_case("sda", "sda" ; "whole disk untouched")]
#[test_case("/dev/sdc1", "sdc" ; "dev prefix stripped")]
fn base_device_name_normalizes_partition_suffixes(input: &str, expected: &str) {
    assert_eq!(base_device_name(input), expected);
}

#[test]
fn root_device_is_flagged_as_system_drive() {
    let classifier = classifier_with(linux_like_table());

    let verdict = classifier.classify(Path::new("/dev/vda"));
    assert!(verdict.is_system_drive);
    assert!(!verdict.safe);
    assert!(
        verdict.reasons.iter().any(|r| r.contains("root filesystem")),
        "expected a root-filesystem reason, got {:?}",
        verdict.reasons
    );
}

#[test]
fn root_partition_and_whole_disk_share_a_base_identity() {
    let classifier = classifier_with(linux_like_table());

    // Targeting the partition node must veto just like the whole disk.
    let verdict = classifier.classify(Path::new("/dev/vda1"));
    assert!(verdict.is_system_drive);
    assert!(!verdict.safe);
}

#[test]
fn separate_boot_disk_is_flagged() {
    let classifier = classifier_with(vec![
        StaticMounts::entry("/dev/vda1", "/", "ext4"),
        StaticMounts::entry("/dev/vdb1", "/boot", "vfat"),
    ]);

    let verdict = classifier.classify(Path::new("/dev/vdb"));
    assert!(verdict.is_system_drive);
    assert!(verdict.reasons.iter().any(|r| r.contains("boot partition")));
}

#[test]
fn unrelated_disk_is_safe() {
    let mut table = linux_like_table();
    table.push(StaticMounts::entry("/dev/vdc1", "/media/usb0", "ext4"));
    let classifier = classifier_with(table);

    let verdict = classifier.classify(Path::new("/dev/vdz"));
    assert!(!verdict.is_system_drive);
    assert!(!verdict.has_mounted_system_path);
    assert!(verdict.safe);
    assert!(verdict.reasons.is_empty());
}

#[test]
fn mounted_critical_path_vetoes_without_system_drive_flag() {
    let classifier = classifier_with(vec![
        StaticMounts::entry("/dev/vda1", "/", "ext4"),
        StaticMounts::entry("/dev/vdb1", "/var", "ext4"),
    ]);

    let verdict = classifier.classify(Path::new("/dev/vdb"));
    assert!(!verdict.is_system_drive);
    assert!(verdict.has_mounted_system_path);
    assert!(!verdict.safe);
    assert!(verdict.reasons.iter().any(|r| r.contains("/var")));
}

#[test]
fn user_data_mounts_are_recorded_but_do_not_veto() {
    let classifier = classifier_with(vec![
        StaticMounts::entry("/dev/vda1", "/", "ext4"),
        StaticMounts::entry("/dev/vdb1", "/home", "ext4"),
    ]);

    let verdict = classifier.classify(Path::new("/dev/vdb"));
    assert!(!verdict.is_system_drive);
    assert!(!verdict.has_mounted_system_path);
    assert_eq!(verdict.mounted_user_paths, vec!["/home".to_string()]);
    assert!(verdict.safe, "user data alone must not veto: {:?}", verdict);
}

#[test]
fn unreadable_mount_table_fails_safe() {
    let classifier = SafetyClassifier::new(Arc::new(UnreadableMounts));

    let verdict = classifier.classify(Path::new("/dev/vdb"));
    assert!(verdict.is_system_drive);
    assert!(!verdict.safe);
    assert!(verdict
        .reasons
        .iter()
        .any(|r| r.contains("cannot verify device safety")));
}

#[test]
fn missing_root_entry_fails_safe() {
    // A table with no /dev-backed root mount cannot prove anything.
    let classifier = classifier_with(vec![StaticMounts::entry("overlay", "/", "overlay")]);

    let verdict = classifier.classify(Path::new("/dev/vdb"));
    assert!(verdict.is_system_drive);
    assert!(!verdict.safe);
}

#[test]
fn verdict_safe_flag_matches_component_flags() {
    let tables = vec![
        linux_like_table(),
        vec![StaticMounts::entry("/dev/vda1", "/", "ext4")],
        vec![
            StaticMounts::entry("/dev/vda1", "/", "ext4"),
            StaticMounts::entry("/dev/vdb1", "/usr", "ext4"),
        ],
    ];

    for table in tables {
        let classifier = classifier_with(table);
        for target in ["/dev/vda", "/dev/vdb", "/dev/vdz"] {
            let verdict = classifier.classify(Path::new(target));
            assert_eq!(
                verdict.safe,
                !(verdict.is_system_drive || verdict.has_mounted_system_path),
                "safe flag inconsistent for {}",
                target
            );
        }
    }
}

#[test]
fn verdicts_are_recomputed_on_every_call() {
    // Same classifier, same device: each classify() reads the table again,
    // so two calls on an unsafe device both veto.
    let classifier = classifier_with(linux_like_table());

    let first = classifier.classify(Path::new("/dev/vda"));
    let second = classifier.classify(Path::new("/dev/vda"));
    assert!(!first.safe);
    assert!(!second.safe);
    assert_eq!(first.reasons, second.reasons);
}
