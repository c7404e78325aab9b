//! Directory entry formatting for LIST, NLST, MLSD, MLST and STAT.

use chrono::{DateTime, Utc};

/// Which listing dialect a transfer produces, and over which channel: MLST
/// and STAT flow over the control connection and finish with `250`, the
/// rest use the data connection and finish with `226`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XferDirMode {
    List,
    Mlsd,
    Mlst,
    Nlst,
    Stat,
}

/// MLST fact selection, toggled by `OPTS MLST`.
#[derive(Debug, Clone, Copy)]
pub struct MlstFacts {
    pub type_: bool,
    pub size: bool,
    pub modify: bool,
    pub perm: bool,
    pub unix_mode: bool,
}

impl Default for MlstFacts {
    fn default() -> Self {
        Self {
            type_: true,
            size: true,
            modify: true,
            perm: true,
            unix_mode: false,
        }
    }
}

/// The slice of stat(2) data the formatters need.
#[derive(Debug, Clone, Copy)]
pub struct EntryInfo {
    pub mode: u32,
    pub size: u64,
    pub mtime: i64,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
}

#[cfg(unix)]
impl From<&std::fs::Metadata> for EntryInfo {
    fn from(meta: &std::fs::Metadata) -> Self {
        use std::os::unix::fs::MetadataExt;

        Self {
            mode: meta.mode(),
            size: meta.size(),
            mtime: meta.mtime(),
            nlink: meta.nlink(),
            uid: meta.uid(),
            gid: meta.gid(),
        }
    }
}

fn is_type(mode: u32, mask: u32) -> bool {
    mode & libc::S_IFMT == mask
}

fn type_fact(mode: u32) -> &'static str {
    if is_type(mode, libc::S_IFREG) {
        "file"
    } else if is_type(mode, libc::S_IFDIR) {
        "dir"
    } else if is_type(mode, libc::S_IFLNK) {
        "os.unix=symlink"
    } else if is_type(mode, libc::S_IFCHR) {
        "os.unix=character"
    } else if is_type(mode, libc::S_IFBLK) {
        "os.unix=block"
    } else if is_type(mode, libc::S_IFIFO) {
        "os.unix=fifo"
    } else if is_type(mode, libc::S_IFSOCK) {
        "os.unix=socket"
    } else {
        "???"
    }
}

fn type_char(mode: u32) -> char {
    if is_type(mode, libc::S_IFREG) {
        '-'
    } else if is_type(mode, libc::S_IFDIR) {
        'd'
    } else if is_type(mode, libc::S_IFLNK) {
        'l'
    } else if is_type(mode, libc::S_IFCHR) {
        'c'
    } else if is_type(mode, libc::S_IFBLK) {
        'b'
    } else if is_type(mode, libc::S_IFIFO) {
        'p'
    } else if is_type(mode, libc::S_IFSOCK) {
        's'
    } else {
        '?'
    }
}

fn perm_bits(mode: u32) -> String {
    let bit = |mask: u32, c: char| if mode & mask != 0 { c } else { '-' };
    [
        bit(libc::S_IRUSR, 'r'),
        bit(libc::S_IWUSR, 'w'),
        bit(libc::S_IXUSR, 'x'),
        bit(libc::S_IRGRP, 'r'),
        bit(libc::S_IWGRP, 'w'),
        bit(libc::S_IXGRP, 'x'),
        bit(libc::S_IROTH, 'r'),
        bit(libc::S_IWOTH, 'w'),
        bit(libc::S_IXOTH, 'x'),
    ]
    .iter()
    .collect()
}

fn mlst_facts(out: &mut String, info: &EntryInfo, type_hint: Option<&str>, facts: &MlstFacts) {
    if facts.type_ {
        out.push_str("Type=");
        out.push_str(type_hint.unwrap_or_else(|| type_fact(info.mode)));
        out.push(';');
    }

    if facts.size {
        out.push_str(&format!("Size={};", info.size));
    }

    if facts.modify {
        let mtime = DateTime::from_timestamp(info.mtime, 0).unwrap_or(DateTime::UNIX_EPOCH);
        out.push_str(&mtime.format("Modify=%Y%m%d%H%M%S;").to_string());
    }

    if facts.perm {
        let dir = is_type(info.mode, libc::S_IFDIR);
        let reg = is_type(info.mode, libc::S_IFREG);
        let readable = info.mode & libc::S_IRUSR != 0;
        let writable = info.mode & libc::S_IWUSR != 0;

        out.push_str("Perm=");
        if reg && writable {
            out.push('a');
        }
        if dir && writable {
            out.push('c');
        }
        out.push('d');
        if dir && info.mode & libc::S_IXUSR != 0 {
            out.push('e');
        }
        out.push('f');
        if dir && readable {
            out.push('l');
        }
        if dir && writable {
            out.push('m');
            out.push('p');
        }
        if reg && readable {
            out.push('r');
        }
        if reg && writable {
            out.push('w');
        }
        out.push(';');
    }

    if facts.unix_mode {
        let mask = 0o7777;
        out.push_str(&format!("UNIX.mode=0{:o};", info.mode & mask));
    }
}

fn long_listing(out: &mut String, info: &EntryInfo, now: i64) {
    out.push(type_char(info.mode));
    out.push_str(&perm_bits(info.mode));
    out.push_str(&format!(
        " {} {} {} {} ",
        info.nlink, info.uid, info.gid, info.size
    ));

    // Recent entries show the time of day, older ones the year.
    let half_year = 60 * 60 * 24 * 365 / 2;
    let fmt = if now > info.mtime && now - info.mtime < half_year {
        "%b %e %H:%M "
    } else {
        "%b %e %Y "
    };

    let mtime = DateTime::from_timestamp(info.mtime, 0).unwrap_or(DateTime::UNIX_EPOCH);
    out.push_str(&mtime.format(fmt).to_string());
}

/// Format one entry. `name` must already be wire-encoded; `now` is the
/// session timestamp used for the LIST recent/old time cutoff.
pub fn format_entry(
    mode: XferDirMode,
    info: &EntryInfo,
    name: &str,
    type_hint: Option<&str>,
    facts: &MlstFacts,
    now: i64,
) -> String {
    let mut out = String::new();

    match mode {
        XferDirMode::Mlsd | XferDirMode::Mlst => {
            if mode == XferDirMode::Mlst {
                out.push(' ');
            }
            mlst_facts(&mut out, info, type_hint, facts);
            if !out.ends_with(' ') {
                out.push(' ');
            }
        }
        XferDirMode::List | XferDirMode::Stat => {
            if mode == XferDirMode::Stat {
                out.push(' ');
            }
            long_listing(&mut out, info, now);
        }
        XferDirMode::Nlst => {}
    }

    out.push_str(name);
    out.push_str("\r\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regular(size: u64, mtime: i64) -> EntryInfo {
        EntryInfo {
            mode: libc::S_IFREG | 0o644,
            size,
            mtime,
            nlink: 1,
            uid: 1000,
            gid: 1000,
        }
    }

    fn directory() -> EntryInfo {
        EntryInfo {
            mode: libc::S_IFDIR | 0o755,
            size: 4096,
            mtime: 0,
            nlink: 2,
            uid: 0,
            gid: 0,
        }
    }

    #[test]
    fn list_line_for_regular_file() {
        // 2021-01-02 03:04:05 UTC, listed long after
        let line = format_entry(
            XferDirMode::List,
            &regular(1234, 1609556645),
            "hello.txt",
            None,
            &MlstFacts::default(),
            1609556645 + 60 * 60 * 24 * 365,
        );
        assert_eq!(line, "-rw-r--r-- 1 1000 1000 1234 Jan  2 2021 hello.txt\r\n");
    }

    #[test]
    fn list_line_uses_clock_time_for_recent_entries() {
        let mtime = 1609556645;
        let line = format_entry(
            XferDirMode::List,
            &regular(1, mtime),
            "f",
            None,
            &MlstFacts::default(),
            mtime + 60,
        );
        assert!(line.contains("Jan  2 03:04 "), "line = {:?}", line);
    }

    #[test]
    fn stat_line_is_indented() {
        let line = format_entry(
            XferDirMode::Stat,
            &regular(1, 0),
            "f",
            None,
            &MlstFacts::default(),
            0,
        );
        assert!(line.starts_with(" -rw-r--r--"));
    }

    #[test]
    fn mlsd_facts_for_directory() {
        let line = format_entry(
            XferDirMode::Mlsd,
            &directory(),
            "sub",
            None,
            &MlstFacts::default(),
            0,
        );
        assert_eq!(
            line,
            "Type=dir;Size=4096;Modify=19700101000000;Perm=cdeflmp; sub\r\n"
        );
    }

    #[test]
    fn mlsd_cdir_hint_overrides_type() {
        let line = format_entry(
            XferDirMode::Mlsd,
            &directory(),
            "/pub",
            Some("cdir"),
            &MlstFacts::default(),
            0,
        );
        assert!(line.starts_with("Type=cdir;"));
    }

    #[test]
    fn mlst_line_is_indented_and_respects_fact_selection() {
        let facts = MlstFacts {
            type_: true,
            size: false,
            modify: false,
            perm: false,
            unix_mode: true,
        };
        let line = format_entry(
            XferDirMode::Mlst,
            &regular(9, 0),
            "/f",
            None,
            &facts,
            0,
        );
        assert_eq!(line, " Type=file;UNIX.mode=0644; /f\r\n");
    }

    #[test]
    fn mlst_perm_facts_for_regular_file() {
        let line = format_entry(
            XferDirMode::Mlst,
            &regular(9, 0),
            "/f",
            None,
            &MlstFacts::default(),
            0,
        );
        assert!(line.contains("Perm=adfrw;"), "line = {:?}", line);
    }

    #[test]
    fn nlst_is_name_only() {
        let line = format_entry(
            XferDirMode::Nlst,
            &regular(9, 0),
            "/d/a\0b",
            None,
            &MlstFacts::default(),
            0,
        );
        assert_eq!(line, "/d/a\0b\r\n");
    }
}
