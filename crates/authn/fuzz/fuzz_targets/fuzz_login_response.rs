//! Fuzz target for WSAA login response parsing and ticket validation.
//!
//! Feeds arbitrary documents to `parse_login_response`. Every document that
//! parses is then validated into an `AccessTicket` and projected into an
//! authorization block. Every step must return `Ok(...)` or `Err(AuthError)`
//! and never panic.

#![no_main]

use arca_sdk_authn::{AccessTicket, parse_login_response};
use arca_sdk_storage::TaxId;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Login responses are XML text
    let Ok(document) = std::str::from_utf8(data) else {
        return;
    };

    let Ok(record) = parse_login_response(document) else {
        return;
    };

    // A record that parsed may still be rejected as a ticket
    let Ok(ticket) = AccessTicket::create(record) else {
        return;
    };

    if let Some(generated) = ticket.generation_time() {
        let _ = ticket.is_expired(generated.to_utc());
    }
    let _ = ticket.format_for_principal(TaxId::from(20_111_111_112));
    let _ = ticket.format_for_principal(TaxId::from(0));

    // A ticket must survive its own persisted form
    let _ = AccessTicket::create(ticket.to_record());
});
