//! Fuzz target for the shared credentials file parser
//!
//! Any file that parses must render to text that parses back to the same
//! sections, and merging it into itself must change nothing.

#![no_main]

use libfuzzer_sys::fuzz_target;
use maws_cache::CredentialsFile;

fuzz_target!(|data: &[u8]| {
    let Ok(contents) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(file) = CredentialsFile::parse(contents) else {
        return;
    };

    let rendered = file.to_string();
    let reparsed = CredentialsFile::parse(&rendered).expect("rendered file must parse");

    // Values are trimmed and keys lowercased on parse, so compare after one round
    let mut merged = reparsed.clone();
    merged.merge(&reparsed);
    assert_eq!(merged, reparsed);
    assert_eq!(reparsed.to_string(), rendered);
});
