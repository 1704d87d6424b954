//! Fuzz target for YOLO single-line label parsing.
//!
//! Feeds arbitrary UTF-8 lines to the label line parser and checks that it
//! never panics and never yields a non-finite box.

#![no_main]

use libfuzzer_sys::fuzz_target;
use yolo_ingest::labels::parse::fuzz_parse_label_line;

fuzz_target!(|data: &[u8]| {
    if data.len() > 1024 * 1024 {
        return;
    }

    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };

    fuzz_parse_label_line(line);
});
