use std::path::Path;

use sysinfo::{DiskExt, System, SystemExt};

/// Free space in bytes on the disk holding `path`.
pub fn get_free_space(path: &Path) -> Option<u64> {
    let mut sys = System::new_all();
    sys.refresh_disks_list();

    // Pick the longest mount point that prefixes the path.
    let mut best: Option<(usize, u64)> = None;
    for disk in sys.disks() {
        let mount = disk.mount_point();
        if path.starts_with(mount) {
            let depth = mount.components().count();
            if best.map_or(true, |(d, _)| depth >= d) {
                best = Some((depth, disk.available_space()));
            }
        }
    }

    best.map(|(_, space)| space)
}

/// Human-readable size, 1024-based.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KiB", "MiB", "GiB", "TiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_size_picks_sane_units() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.00 MiB");
    }

    #[test]
    fn free_space_of_root_is_known() {
        // Every unix system has a mount covering /.
        assert!(get_free_space(Path::new("/")).is_some());
    }
}
