#![no_main]

use authlink::protocol::handshake::{authenticate, Credential, MemoryCredentialStore};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(credential) = Credential::from_password("user1", "password") else {
        return;
    };
    let store = MemoryCredentialStore::new().with_credential(credential);
    let runtime = match tokio::runtime::Builder::new_current_thread().build() {
        Ok(runtime) => runtime,
        Err(_) => return,
    };
    let mut source = data;
    let _ = runtime.block_on(authenticate(&mut source, &store));
});
