//! Fuzz target for log line parsing.
//!
//! # Safety Properties Tested
//! - No panics on arbitrary input, valid UTF-8 or not
//! - A parsed line renders back to a line that parses to the same record

#![no_main]

use libfuzzer_sys::fuzz_target;
use snapshot_harness::parse_line;

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let Some(record) = parse_line(&line) else {
        return;
    };

    // A whitespace-only message trims away and leaves nothing to re-parse.
    if record.message.is_empty() {
        return;
    }
    let rendered = record.to_string();
    let again = parse_line(&rendered).expect("rendered line must parse");
    assert_eq!(again.timestamp, record.timestamp);
    assert_eq!(again.level, record.level);
    assert_eq!(again.category, record.category);
    assert_eq!(again.metadata, record.metadata);
});
