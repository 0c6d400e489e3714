#![no_main]

use libfuzzer_sys::fuzz_target;
use otm_invoice::core::CanonicalInvoiceBuilder;

fuzz_target!(|data: &[u8]| {
    // Build → serialize both ways → read back must not panic at any step.
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(data) {
        if let Ok(invoice) = CanonicalInvoiceBuilder::default().from_object(&value, None) {
            let _ = otm_invoice::resource::to_resource_json(&invoice);
            if let Ok(xml) = otm_invoice::transmission::to_transmission_xml(&invoice) {
                let _ = otm_invoice::transmission::read_invoice_summary(&xml.text);
            }
        }
    }
});
