#![no_main]

use authlink::core::frame::decode_with_limit;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must decode to a value or an error, never a panic or a huge allocation
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(_) => return,
    };
    let mut source = data;
    while !source.is_empty() {
        if runtime
            .block_on(decode_with_limit(&mut source, 64 * 1024))
            .is_err()
        {
            break;
        }
    }
});
