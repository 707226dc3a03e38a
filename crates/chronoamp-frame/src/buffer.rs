use bytes::{Bytes, BytesMut};

/// Line terminator of the device protocol.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Separator between fields of one line.
pub(crate) const FIELD_SEPARATOR: u8 = b',';

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;

/// One complete line of the stream, terminator removed.
///
/// Trailing whitespace (the device ends lines with `\r\n`) and trailing field
/// separators are stripped on construction. A candidate frame has not been
/// validated yet; see [`crate::decode_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFrame {
    bytes: Bytes,
}

impl CandidateFrame {
    /// Build a candidate frame from one line (without its terminator).
    pub fn new(line: impl Into<Bytes>) -> Self {
        let mut bytes: Bytes = line.into();
        let kept = trimmed_len(&bytes);
        bytes.truncate(kept);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The line as text, or `None` if it is not valid UTF-8.
    pub fn as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn trimmed_len(line: &[u8]) -> usize {
    let mut end = line.len();
    while end > 0 && line[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    while end > 0 && line[end - 1] == FIELD_SEPARATOR {
        end -= 1;
    }
    end
}

/// Incremental line splitter.
///
/// Bytes are appended as they arrive; every complete line is handed out
/// exactly once and the unterminated trailing fragment is retained until a
/// later read completes it. Callers never see a truncated line.
#[derive(Debug)]
pub struct LineBuffer {
    buf: BytesMut,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Append `chunk` and return every line it completes, in stream order.
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<CandidateFrame> {
        self.extend(chunk);
        self.drain_frames()
    }

    /// Append raw bytes to the retained tail without splitting.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Retained tail plus everything appended since the last drain.
    pub fn combined(&self) -> &[u8] {
        &self.buf
    }

    /// Number of buffered bytes not yet handed out as lines.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Split off every complete line.
    ///
    /// The piece after the last terminator stays buffered. When the buffer
    /// ends exactly on a terminator that piece is empty and the tail resets.
    pub fn drain_frames(&mut self) -> Vec<CandidateFrame> {
        let Some(last) = self.buf.iter().rposition(|&b| b == LINE_TERMINATOR) else {
            return Vec::new();
        };

        let complete = self.buf.split_to(last + 1).freeze();
        complete[..last]
            .split(|&b| b == LINE_TERMINATOR)
            .map(|line| CandidateFrame::new(complete.slice_ref(line)))
            .collect()
    }

    /// Drop any buffered bytes.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &[u8] = b"1,2,5000,3,4,6000,5,6,7000,7,8,8000\n\
        0.5,10,1234,0.5,10,2345,0.5,10,3456,0.5,10,4567,\n\
        -1,20,-500,-1,20,-600,-1,20,-700,-1,20,-800\r\n\
        \n\
        v_bias1,time1,i1,v_bias2,time2,i2,v_bias3,time3,i3,v_bias4,time4,i4\n";

    fn texts(frames: &[CandidateFrame]) -> Vec<String> {
        frames
            .iter()
            .map(|f| f.as_str().unwrap().to_string())
            .collect()
    }

    fn feed_chunks(stream: &[u8], sizes: impl Iterator<Item = usize>) -> Vec<CandidateFrame> {
        let mut buffer = LineBuffer::new();
        let mut frames = Vec::new();
        let mut offset = 0;
        for size in sizes {
            if offset >= stream.len() {
                break;
            }
            let end = (offset + size.max(1)).min(stream.len());
            frames.extend(buffer.ingest(&stream[offset..end]));
            offset = end;
        }
        if offset < stream.len() {
            frames.extend(buffer.ingest(&stream[offset..]));
        }
        frames
    }

    #[test]
    fn splits_whole_stream() {
        let mut buffer = LineBuffer::new();
        let frames = buffer.ingest(STREAM);

        assert_eq!(
            texts(&frames),
            vec![
                "1,2,5000,3,4,6000,5,6,7000,7,8,8000",
                "0.5,10,1234,0.5,10,2345,0.5,10,3456,0.5,10,4567",
                "-1,20,-500,-1,20,-600,-1,20,-700,-1,20,-800",
                "",
                "v_bias1,time1,i1,v_bias2,time2,i2,v_bias3,time3,i3,v_bias4,time4,i4",
            ]
        );
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn chunking_never_changes_the_frames() {
        let whole = LineBuffer::new().ingest(STREAM);

        for size in 1..=STREAM.len() {
            let chunked = feed_chunks(STREAM, std::iter::repeat(size));
            assert_eq!(chunked, whole, "fixed chunk size {size}");
        }

        // Uneven partitions from a small deterministic generator.
        let mut state = 0x2545_f491_u32;
        for _ in 0..200 {
            let sizes = std::iter::from_fn(|| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                Some((state >> 16) as usize % 37 + 1)
            });
            assert_eq!(feed_chunks(STREAM, sizes), whole);
        }
    }

    #[test]
    fn partial_fragment_is_retained_not_yielded() {
        let mut buffer = LineBuffer::new();

        assert!(buffer.ingest(b"1,2,5000,3,4").is_empty());
        assert_eq!(buffer.combined(), b"1,2,5000,3,4");

        assert!(buffer.ingest(b",6000,5,6,7000").is_empty());
        assert_eq!(buffer.pending_len(), 26);

        let frames = buffer.ingest(b",7,8,8000\n9,9");
        assert_eq!(texts(&frames), vec!["1,2,5000,3,4,6000,5,6,7000,7,8,8000"]);
        assert_eq!(buffer.combined(), b"9,9");
    }

    #[test]
    fn yielded_frames_always_end_on_a_terminator() {
        // Every prefix of the stream: only lines whose terminator has been
        // consumed may come out.
        for cut in 0..=STREAM.len() {
            let mut buffer = LineBuffer::new();
            let frames = buffer.ingest(&STREAM[..cut]);
            let terminators = STREAM[..cut]
                .iter()
                .filter(|&&b| b == LINE_TERMINATOR)
                .count();
            assert_eq!(frames.len(), terminators, "prefix length {cut}");

            let tail_start = STREAM[..cut]
                .iter()
                .rposition(|&b| b == LINE_TERMINATOR)
                .map_or(0, |p| p + 1);
            assert_eq!(buffer.combined(), &STREAM[tail_start..cut]);
        }
    }

    #[test]
    fn empty_read_yields_nothing() {
        let mut buffer = LineBuffer::new();
        buffer.ingest(b"1,2");
        assert!(buffer.ingest(b"").is_empty());
        assert_eq!(buffer.combined(), b"1,2");
    }

    #[test]
    fn trailing_separators_and_carriage_returns_are_stripped() {
        assert_eq!(CandidateFrame::new(&b"1,2,3,"[..]).as_bytes(), b"1,2,3");
        assert_eq!(CandidateFrame::new(&b"1,2,3,,\r"[..]).as_bytes(), b"1,2,3");
        assert_eq!(CandidateFrame::new(&b",1"[..]).as_bytes(), b",1");
        assert!(CandidateFrame::new(&b",\r"[..]).is_empty());
    }

    #[test]
    fn boundary_reset_after_clean_line_end() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.ingest(b"a,b\n").len(), 1);
        assert_eq!(buffer.pending_len(), 0);
        let frames = buffer.ingest(b"c,d\n");
        assert_eq!(texts(&frames), vec!["c,d"]);
    }

    #[test]
    fn non_utf8_line_is_still_framed() {
        let mut buffer = LineBuffer::new();
        let frames = buffer.ingest(b"\xff\xfe\n1\n");
        assert_eq!(frames.len(), 2);
        assert!(frames[0].as_str().is_none());
        assert_eq!(frames[1].as_str(), Some("1"));
    }

    #[test]
    fn clear_discards_tail() {
        let mut buffer = LineBuffer::default();
        buffer.extend(b"partial");
        buffer.clear();
        assert_eq!(buffer.pending_len(), 0);
        assert!(buffer.drain_frames().is_empty());
    }
}
