//! Log timestamp formatting.
//!
//! The format is `YYYY_MM_DD-HH_MM_SS.ffffff` in local time with zero-padded
//! microseconds. It doubles as the embedded interval in rotated-file names,
//! where its lexicographic order is chronological.

use chrono::Local;

/// Formats the current local time as `YYYY_MM_DD-HH_MM_SS.ffffff`.
pub(crate) fn now() -> String {
    Local::now().format("%Y_%m_%d-%H_%M_%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape() {
        let ts = now();
        // YYYY_MM_DD-HH_MM_SS.ffffff
        assert_eq!(ts.len(), 26, "unexpected timestamp {ts:?}");
        assert_eq!(&ts[4..5], "_");
        assert_eq!(&ts[7..8], "_");
        assert_eq!(&ts[10..11], "-");
        assert_eq!(&ts[13..14], "_");
        assert_eq!(&ts[16..17], "_");
        assert_eq!(&ts[19..20], ".");
        assert!(ts[20..].chars().all(|c| c.is_ascii_digit()));
        assert_eq!(ts[20..].len(), 6);
    }

    #[test]
    fn test_lexicographic_order_is_chronological() {
        let first = now();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = now();
        assert!(first < second);
    }
}
