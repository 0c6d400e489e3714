#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Backend responses are untrusted: errors are fine, panics are bugs.
        let _ = otm_invoice::transmission::parse_transmission_ack(s);
        let _ = otm_invoice::transmission::parse_status(s);
        let _ = otm_invoice::transmission::parse_log_rows(s);
        let _ = otm_invoice::transmission::read_invoice_summary(s);
    }
});
