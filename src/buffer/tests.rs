use super::*;

#[test]
fn test_push_tracks_chars_and_lines() {
    let mut buffer = ContentBuffer::new();
    assert_eq!(buffer.push_str("ab\ncd").unwrap(), 0);
    assert_eq!(buffer.push_str("\r\nef\r").unwrap(), 5);

    assert_eq!(buffer.len(), 10);
    assert_eq!(buffer.line_starts(), &[3, 7, 10]);
    assert_eq!(
        buffer.terminator_stats(),
        TerminatorStats { lf: 1, cr: 1, crlf: 1 }
    );
}

#[test]
fn test_crlf_split_across_pushes_counts_once() {
    let mut buffer = ContentBuffer::new();
    buffer.push_str("a\r").unwrap();
    assert_eq!(buffer.line_starts(), &[2]);

    buffer.push_str("\nb").unwrap();
    assert_eq!(buffer.line_starts(), &[3]);
    assert_eq!(buffer.terminator_stats().crlf, 1);
    assert_eq!(buffer.terminator_stats().cr, 0);
}

#[test]
fn test_slice_multibyte_past_checkpoints() {
    let text: String = "é世a".repeat(300);
    let buffer = ContentBuffer::from_text(&text).unwrap();

    assert_eq!(buffer.len(), 900);
    // 255 and 258 straddle the checkpoint at char 256
    assert_eq!(buffer.slice(255, 3), "é世a");
    assert_eq!(buffer.char_to_byte(256), 256 / 3 * 6 + 2);
    assert_eq!(buffer.slice(600, 3), "é世a");
    assert_eq!(buffer.char_at(899), Some('a'));
    assert_eq!(buffer.char_at(900), None);
    assert_eq!(buffer.slice(900, 0), "");
}

#[test]
fn test_breaks_in_sub_ranges() {
    let buffer = ContentBuffer::from_text("ab\r\ncd\nef").unwrap();

    assert_eq!(buffer.breaks_in(0, 9), (2, 2));
    assert_eq!(buffer.breaks_in(0, 2), (0, 2));
    // ends on the '\r' of a CRLF pair
    assert_eq!(buffer.breaks_in(0, 3), (1, 0));
    // starts on the '\n' of a CRLF pair
    assert_eq!(buffer.breaks_in(3, 5), (1, 1));
    assert_eq!(buffer.breaks_in(4, 7), (1, 0));
}

#[test]
fn test_append_pages_do_not_split_text() {
    let mut store = BufferStore::new(Arc::new(ContentBuffer::new()), 4);

    assert_eq!(store.append("abc").unwrap(), (BufferId::Added(0), 0, 3));
    assert_eq!(store.append("d").unwrap(), (BufferId::Added(0), 3, 1));
    // does not fit the tail page
    assert_eq!(store.append("efg").unwrap(), (BufferId::Added(1), 0, 3));
    // larger than a page gets a page of its own
    assert_eq!(store.append("hijklm").unwrap(), (BufferId::Added(2), 0, 6));

    assert_eq!(store.slice(BufferId::Added(0), 0, 4), "abcd");
    assert_eq!(store.slice(BufferId::Added(2), 2, 3), "jkl");
    assert_eq!(store.added_len(), 13);
}

#[test]
fn test_snapshot_keeps_tail_page_contents() {
    let mut store = BufferStore::new(Arc::new(ContentBuffer::new()), 64);
    store.append("hello").unwrap();

    let snapshot = store.clone();
    store.append(" world").unwrap();

    assert_eq!(snapshot.buffer(BufferId::Added(0)).as_str(), "hello");
    assert_eq!(store.buffer(BufferId::Added(0)).as_str(), "hello world");
}
