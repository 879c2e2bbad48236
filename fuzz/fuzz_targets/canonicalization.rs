#![no_main]

use libfuzzer_sys::fuzz_target;
use lazy_locator::{canonicalize, ServiceName};

fuzz_target!(|data: &[u8]| {
    let Ok(name) = std::str::from_utf8(data) else {
        return;
    };

    let canonical = canonicalize(name);
    assert_eq!(canonicalize(&canonical), canonical);
    assert!(!canonical.contains(['-', '_', ' ', '\\', '/']));

    let service = ServiceName::new(name);
    assert_eq!(service.canonical(), canonical);
    assert_eq!(service.requested(), name);
});
