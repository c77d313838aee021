#![no_main]

use escape_sync_client::protocol::ServerMessage;
use escape_sync_client::GameEvent;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Raw-byte path, including serde_json's own UTF-8 validation.
    let _ = serde_json::from_slice::<ServerMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = serde_json::from_str::<ServerMessage>(s) {
            // Every parsed message either maps to an event that maps back,
            // or is unknown.
            if let Ok(event) = GameEvent::try_from(msg) {
                let _ = event.to_server_message();
            }
        }
    }
});
