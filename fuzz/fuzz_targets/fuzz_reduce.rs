#![no_main]

use libfuzzer_sys::fuzz_target;
use spin_wheel_client::protocol::ServerMessage;
use spin_wheel_client::state::{reduce, SessionState};

// Newline-separated frames are decoded and folded through the reducer. Every
// accepted transition must leave a consistent state.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let mut state = SessionState::default();
    for line in text.lines() {
        let Ok(msg) = serde_json::from_str::<ServerMessage>(line) else {
            continue;
        };
        if let Ok(next) = reduce(&state, &msg) {
            assert!(next.state.is_consistent(), "{msg:?} produced {:?}", next.state);
            state = next.state;
        }
    }
});
