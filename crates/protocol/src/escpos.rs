//! ESC/POS control sequences
//!
//! Only the handful of commands the transport appends on its own. Anything
//! else is the caller's business and travels inside a raw payload.

/// ESC @ - initialize printer
pub const RESET: [u8; 2] = [0x1B, 0x40];

/// LF - print and feed one line
pub const LINE_FEED: [u8; 1] = [0x0A];

/// ESC d 2 - print and feed two lines
pub const FEED_LINES: [u8; 3] = [0x1B, 0x64, 0x02];

/// GS V 0 - full paper cut
pub const FULL_CUT: [u8; 3] = [0x1D, 0x56, 0x00];

/// GS V - prefix shared by every cut variant
pub const CUT_PREFIX: [u8; 2] = [0x1D, 0x56];

/// Number of trailing bytes searched for a cut command
pub const CUT_SCAN_WINDOW: usize = 16;

/// Whether a raw payload already ends with a cut command
///
/// Heuristic: a `GS V` pair anywhere in the last [`CUT_SCAN_WINDOW`] bytes.
pub fn ends_with_cut(data: &[u8]) -> bool {
    if data.len() < CUT_PREFIX.len() {
        return false;
    }

    let start = data.len().saturating_sub(CUT_SCAN_WINDOW);
    data[start..].windows(CUT_PREFIX.len()).any(|w| w == CUT_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_bytes() {
        assert_eq!(RESET, [0x1B, 0x40]);
        assert_eq!(LINE_FEED, [0x0A]);
        assert_eq!(FEED_LINES, [0x1B, 0x64, 0x02]);
        assert_eq!(FULL_CUT, [0x1D, 0x56, 0x00]);
    }

    #[test]
    fn test_ends_with_cut_short_input() {
        assert!(!ends_with_cut(&[]));
        assert!(!ends_with_cut(&[0x1D]));
        assert!(ends_with_cut(&[0x1D, 0x56]));
    }

    #[test]
    fn test_ends_with_cut_any_cut_mode() {
        assert!(ends_with_cut(b"hello\n\x1D\x56\x00"));
        // Partial cut with feed (GS V 66 n)
        assert!(ends_with_cut(b"hello\n\x1D\x56\x42\x10"));
    }

    #[test]
    fn test_ends_with_cut_window_edge() {
        // Cut pair starts exactly at the first byte of the window
        let mut data = vec![b'x'; 40];
        data.extend_from_slice(&[0x1D, 0x56]);
        data.extend_from_slice(&[b'y'; 14]);
        assert_eq!(data.len() - 16, 40);
        assert!(ends_with_cut(&data));

        // One byte further back and it falls outside the window
        let mut data = vec![b'x'; 40];
        data.extend_from_slice(&[0x1D, 0x56]);
        data.extend_from_slice(&[b'y'; 15]);
        assert!(!ends_with_cut(&data));
    }

    #[test]
    fn test_ends_with_cut_split_pair_not_matched() {
        let data = [b'a', 0x1D, b'b', 0x56];
        assert!(!ends_with_cut(&data));
    }
}
