#![no_main]

use libfuzzer_sys::fuzz_target;
use vibechess_client::model::ChatMessage;
use vibechess_client::protocol::Frame;
use vibechess_client::sse::SseDecoder;

fuzz_target!(|data: &[u8]| {
    // Frame parsing on arbitrary text, plus message derivation for anything
    // that parses.
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(frame) = Frame::parse(s) {
            let _ = ChatMessage::from_event(&frame.event);
        }
    }

    // The SSE decoder must accept any byte sequence, split anywhere.
    let split = data.first().map_or(1, |b| usize::from(*b).max(1));
    let mut decoder = SseDecoder::new();
    for chunk in data.chunks(split) {
        for payload in decoder.feed(chunk) {
            let _ = Frame::parse(&payload);
        }
    }
    let _ = decoder.finish();
});
