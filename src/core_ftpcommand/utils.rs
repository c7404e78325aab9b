//! Path handling shared by the command handlers.
//!
//! FTP encodes an embedded LF in a path as a NUL byte on the wire, and PWD
//! responses double any quote character. Resolution collapses `.` and `..`
//! lexically but first requires the parent of the given path to exist and be
//! a directory, so a bogus prefix fails with `ENOTDIR` instead of silently
//! normalizing away.

use std::fs;
use std::io;

/// Encode a path for the wire: LF becomes NUL, and with `quotes` every `"`
/// is doubled (PWD responses).
pub fn encode_path(path: &str, quotes: bool) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        match c {
            '\n' => out.push('\0'),
            '"' if quotes => out.push_str("\"\""),
            c => out.push(c),
        }
    }
    out
}

/// Decode a received command line in place: NUL becomes LF.
pub fn decode_path(buffer: &mut [u8]) {
    for byte in buffer.iter_mut() {
        if *byte == 0 {
            *byte = b'\n';
        }
    }
}

/// Parent directory of a path, `/` for top-level entries.
pub fn dir_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(pos) => &path[..pos],
    }
}

/// Collapse `.` and `..` components of an absolute path. The parent of the
/// unresolved path must exist and be a directory.
pub fn resolve_path(path: &str) -> io::Result<String> {
    debug_assert!(path.starts_with('/'));

    let parent = fs::metadata(dir_name(path))?;
    if !parent.is_dir() {
        return Err(io::Error::from_raw_os_error(libc::ENOTDIR));
    }

    let mut components: Vec<&str> = Vec::new();
    for component in path.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                components.pop();
            }
            component => components.push(component),
        }
    }

    if components.is_empty() {
        return Ok(String::from("/"));
    }

    let mut out = String::new();
    for component in components {
        out.push('/');
        out.push_str(component);
    }
    Ok(out)
}

/// Join a (possibly relative) argument onto the working directory and
/// coalesce consecutive slashes.
pub fn build_path(cwd: &str, args: &str) -> String {
    let joined = if args.starts_with('/') {
        String::from(args)
    } else {
        format!("{}/{}", cwd, args)
    };

    let mut out = String::with_capacity(joined.len());
    for c in joined.chars() {
        if c == '/' && out.ends_with('/') {
            continue;
        }
        out.push(c);
    }
    out
}

pub fn build_resolved_path(cwd: &str, args: &str) -> io::Result<String> {
    resolve_path(&build_path(cwd, args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn encode_plain_path_is_identity() {
        assert_eq!(encode_path("/a/b.txt", false), "/a/b.txt");
    }

    #[test]
    fn encode_linefeed_as_nul() {
        assert_eq!(encode_path("a\nb", false), "a\0b");
    }

    #[test]
    fn encode_doubles_quotes_when_asked() {
        assert_eq!(encode_path("c\"d", false), "c\"d");
        assert_eq!(encode_path("c\"d", true), "c\"\"d");
    }

    #[test]
    fn decode_nul_as_linefeed() {
        let mut line = b"RETR a\0b".to_vec();
        decode_path(&mut line);
        assert_eq!(line, b"RETR a\nb");
    }

    #[test]
    fn dir_name_of_nested_path() {
        assert_eq!(dir_name("/a/b/c"), "/a/b");
        assert_eq!(dir_name("/a"), "/");
        assert_eq!(dir_name("/"), "/");
    }

    #[test]
    fn build_path_relative_and_absolute() {
        assert_eq!(build_path("/a", "b"), "/a/b");
        assert_eq!(build_path("/a", "/b"), "/b");
        assert_eq!(build_path("/", "b"), "/b");
        assert_eq!(build_path("/a//", "b///c"), "/a/b/c");
    }

    #[test]
    fn resolve_collapses_dots() {
        assert_eq!(resolve_path("/tmp/.").unwrap(), "/tmp");
        assert_eq!(resolve_path("/tmp/..").unwrap(), "/");
    }

    #[test]
    fn resolve_never_escapes_root() {
        assert_eq!(resolve_path("/../..").unwrap(), "/");
        for k in 0..8 {
            let path = format!("/{}x", "../".repeat(k));
            assert_eq!(resolve_path(&path).unwrap(), "/x");
        }
    }

    #[test]
    fn resolve_rejects_file_parent() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("plain");
        std::fs::write(&file, b"x").unwrap();

        let path = format!("{}/child", file.display());
        assert!(resolve_path(&path).is_err());
    }

    proptest! {
        #[test]
        fn resolve_is_idempotent(parts in proptest::collection::vec(
            prop_oneof![Just(".."), Just("."), Just("tmp"), Just("x")], 0..6))
        {
            let mut path = String::from("/");
            path.push_str(&parts.join("/"));

            if let Ok(resolved) = resolve_path(&path) {
                prop_assert_eq!(resolve_path(&resolved).unwrap(), resolved);
            }
        }

        #[test]
        fn encode_decode_roundtrip(s in "[a-z/\n .]{0,40}") {
            let mut encoded = encode_path(&s, false).into_bytes();
            decode_path(&mut encoded);
            prop_assert_eq!(String::from_utf8(encoded).unwrap(), s);
        }
    }
}
