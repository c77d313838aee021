#![no_main]

use escape_sync_client::protocol::ServerMessage;
use escape_sync_client::GameView;
use libfuzzer_sys::fuzz_target;

// Newline-separated JSON frames applied in order to one view.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut view = GameView::new(Some(1));
    for line in text.lines() {
        let Ok(msg) = serde_json::from_str::<ServerMessage>(line) else {
            continue;
        };
        let was_resolved = view.is_resolved();
        if let Ok(next) = view.apply(&msg) {
            view = next;
        }
        // Once found, the target stays found.
        assert!(!was_resolved || view.is_resolved());
    }
});
