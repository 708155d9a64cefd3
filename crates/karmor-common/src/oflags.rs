//! Open-flag classification: translate raw `open(2)`/`openat(2)` flags into
//! their symbolic name.

const ACCMODE: u32 = libc::O_ACCMODE as u32;

const MODIFIER_BITS: &[(u32, &str)] = &[
    (libc::O_CREAT as u32, "O_CREAT"),
    (libc::O_EXCL as u32, "O_EXCL"),
    (libc::O_NOCTTY as u32, "O_NOCTTY"),
    (libc::O_TRUNC as u32, "O_TRUNC"),
    (libc::O_APPEND as u32, "O_APPEND"),
    (libc::O_NONBLOCK as u32, "O_NONBLOCK"),
    (libc::O_DSYNC as u32, "O_DSYNC"),
    (libc::O_DIRECT as u32, "O_DIRECT"),
    (libc::O_DIRECTORY as u32, "O_DIRECTORY"),
    (libc::O_NOFOLLOW as u32, "O_NOFOLLOW"),
    (libc::O_CLOEXEC as u32, "O_CLOEXEC"),
    (libc::O_SYNC as u32, "O_SYNC"),
];

/// Renders raw `open`/`openat` flags as a `|`-joined symbolic expression,
/// e.g. `0` -> `"O_RDONLY"`, `O_WRONLY|O_CREAT` -> `"O_WRONLY|O_CREAT"`.
#[must_use]
pub fn oflags_name(flags: u32) -> String {
    let mut names = vec![match flags & ACCMODE {
        x if x == libc::O_WRONLY as u32 => "O_WRONLY",
        x if x == libc::O_RDWR as u32 => "O_RDWR",
        _ => "O_RDONLY",
    }];
    for &(bit, name) in MODIFIER_BITS {
        if flags & bit != 0 {
            names.push(name);
        }
    }
    names.join("|")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rdonly_is_the_zero_value() {
        assert_eq!(oflags_name(0), "O_RDONLY");
    }

    #[test]
    fn access_mode_is_exclusive() {
        assert_eq!(oflags_name(libc::O_WRONLY as u32), "O_WRONLY");
        assert_eq!(oflags_name(libc::O_RDWR as u32), "O_RDWR");
    }

    #[test]
    fn modifier_bits_append_in_declared_order() {
        let flags = libc::O_WRONLY as u32 | libc::O_CREAT as u32 | libc::O_TRUNC as u32;
        assert_eq!(oflags_name(flags), "O_WRONLY|O_CREAT|O_TRUNC");
    }

    #[test]
    fn unrecognized_bits_are_silently_dropped() {
        assert_eq!(oflags_name(1 << 30), "O_RDONLY");
    }
}
