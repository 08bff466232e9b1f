//! Bounded copy of NUL-terminated text into caller buffers.
//!
//! Used by `XH_VersionA` and `XH_LoaderErrorA`: the source is copied byte by
//! byte until a NUL or until one byte short of the destination, then a NUL is
//! written at the stop position.

/// Returns the length of `src` up to the first NUL byte.
///
/// If no NUL is found, returns the full slice length.
pub fn c_text_len(src: &[u8]) -> usize {
    src.iter().position(|&c| c == 0).unwrap_or(src.len())
}

/// Copies `src` into `dst`, always NUL-terminating within `dst`.
///
/// Copies at most `dst.len() - 1` bytes and stops early at a NUL in `src`.
/// Returns the number of bytes copied, not counting the terminator. An empty
/// `dst` is left untouched and 0 is returned.
pub fn copy_terminated(dst: &mut [u8], src: &[u8]) -> usize {
    let Some(limit) = dst.len().checked_sub(1) else {
        return 0;
    };
    let n = c_text_len(src).min(limit);
    dst[..n].copy_from_slice(&src[..n]);
    dst[n] = 0;
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_text_len() {
        assert_eq!(c_text_len(b"1.8.4\0junk"), 5);
        assert_eq!(c_text_len(b"no terminator"), 13);
        assert_eq!(c_text_len(b"\0"), 0);
        assert_eq!(c_text_len(b""), 0);
    }

    #[test]
    fn test_copy_fits() {
        let mut buf = [0xAAu8; 16];
        let n = copy_terminated(&mut buf, b"Xray 1.8.4\0");
        assert_eq!(n, 10);
        assert_eq!(&buf[..11], b"Xray 1.8.4\0");
        assert_eq!(buf[11], 0xAA);
    }

    #[test]
    fn test_copy_truncates_to_cap_minus_one() {
        let mut buf = [0xAAu8; 5];
        let n = copy_terminated(&mut buf, b"Xray 1.8.4\0");
        assert_eq!(n, 4);
        assert_eq!(&buf, b"Xray\0");
    }

    #[test]
    fn test_copy_cap_one_writes_only_terminator() {
        let mut buf = [0xAAu8; 1];
        assert_eq!(copy_terminated(&mut buf, b"Xray\0"), 0);
        assert_eq!(buf, [0]);
    }

    #[test]
    fn test_copy_empty_destination() {
        let mut buf: [u8; 0] = [];
        assert_eq!(copy_terminated(&mut buf, b"Xray\0"), 0);
    }

    #[test]
    fn test_copy_exact_fit() {
        let mut buf = [0xAAu8; 5];
        assert_eq!(copy_terminated(&mut buf, b"1.8.4"), 4);
        assert_eq!(&buf, b"1.8.\0");

        let mut buf = [0xAAu8; 6];
        assert_eq!(copy_terminated(&mut buf, b"1.8.4"), 5);
        assert_eq!(&buf, b"1.8.4\0");
    }
}
