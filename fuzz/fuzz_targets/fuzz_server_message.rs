#![no_main]

use libfuzzer_sys::fuzz_target;
use spin_wheel_client::protocol::ServerMessage;

fuzz_target!(|data: &[u8]| {
    // Any frame must either decode or be refused; never panic.
    if let Ok(msg) = serde_json::from_slice::<ServerMessage>(data) {
        let _ = msg.event_name();
        let _ = serde_json::to_string(&msg);
    }
});
