//! End-of-stream detection.
//!
//! A session ends normally when the device sends the sentinel text or closes
//! its side of the connection. Neither is an error.

use std::fmt;

/// Literal marker the device sends after its last measurement.
pub const DEFAULT_SENTINEL: &str = "STOP";

/// How the stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A read returned zero bytes.
    PeerClosed,
    /// The accumulated buffer contained the sentinel.
    Sentinel,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::PeerClosed => f.write_str("peer closed"),
            Termination::Sentinel => f.write_str("sentinel received"),
        }
    }
}

/// Evaluated once per read, after the read's lines have been processed.
#[derive(Debug, Clone)]
pub struct TerminationDetector {
    sentinel: Vec<u8>,
}

impl Default for TerminationDetector {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL)
    }
}

impl TerminationDetector {
    pub fn new(sentinel: impl AsRef<[u8]>) -> Self {
        Self {
            sentinel: sentinel.as_ref().to_vec(),
        }
    }

    pub fn sentinel(&self) -> &[u8] {
        &self.sentinel
    }

    /// Check one read.
    ///
    /// `combined` is the retained tail plus the bytes just read, before any
    /// lines were split off, so a sentinel straddling two reads is still seen.
    pub fn check(&self, bytes_read: usize, combined: &[u8]) -> Option<Termination> {
        if bytes_read == 0 {
            return Some(Termination::PeerClosed);
        }
        if self.contains_sentinel(combined) {
            return Some(Termination::Sentinel);
        }
        None
    }

    fn contains_sentinel(&self, haystack: &[u8]) -> bool {
        if self.sentinel.is_empty() {
            return false;
        }
        haystack
            .windows(self.sentinel.len())
            .any(|window| window == self.sentinel.as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_byte_read_means_peer_closed() {
        let detector = TerminationDetector::default();
        assert_eq!(detector.check(0, b""), Some(Termination::PeerClosed));
        assert_eq!(detector.check(0, b"1,2,3"), Some(Termination::PeerClosed));
    }

    #[test]
    fn sentinel_anywhere_in_buffer() {
        let detector = TerminationDetector::default();
        assert_eq!(detector.check(5, b"STOP\n"), Some(Termination::Sentinel));
        assert_eq!(
            detector.check(16, b"1,2,5000,STOP\r\n"),
            Some(Termination::Sentinel)
        );
        assert_eq!(detector.check(4, b"  STOP  "), Some(Termination::Sentinel));
    }

    #[test]
    fn ordinary_data_does_not_terminate() {
        let detector = TerminationDetector::default();
        assert_eq!(detector.check(8, b"1,2,3,4\n"), None);
        assert_eq!(detector.check(4, b"STO"), None);
        assert_eq!(detector.check(4, b"stop"), None);
    }

    #[test]
    fn sentinel_split_across_reads_is_seen_in_combined_buffer() {
        let detector = TerminationDetector::default();
        // "ST" was retained as the unterminated tail of the previous read.
        assert_eq!(detector.check(3, b"STOP\n"), Some(Termination::Sentinel));
    }

    #[test]
    fn custom_sentinel() {
        let detector = TerminationDetector::new("END");
        assert_eq!(detector.sentinel(), b"END");
        assert_eq!(detector.check(4, b"END\n"), Some(Termination::Sentinel));
        assert_eq!(detector.check(5, b"STOP\n"), None);
    }

    #[test]
    fn empty_sentinel_never_matches() {
        let detector = TerminationDetector::new("");
        assert_eq!(detector.check(3, b"abc"), None);
    }
}
