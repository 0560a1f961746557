// SPDX-License-Identifier: MIT OR Apache-2.0
//! Fuzz command-string tokenization.
//!
//! Verifies that splitting never panics and that re-quoting the tokens
//! with `shell_words::join` splits back to the same argument vector.
#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(argv) = shell_words::split(s) else {
        return;
    };

    let joined = shell_words::join(&argv);
    let again = shell_words::split(&joined).expect("joined tokens must split");
    assert_eq!(argv, again);
});
