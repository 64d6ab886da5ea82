use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::RngCore;
use std::fmt;

/// A plaintext token handed to a client (cookie, activation link).
///
/// Only its digest is ever persisted. `Debug` is redacted so a token cannot
/// end up in logs through `{:?}`.
#[derive(Clone, PartialEq, Eq)]
pub struct PlainToken(String);

impl PlainToken {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for PlainToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlainToken(<redacted>)")
    }
}

/// Generate a URL-safe random token from `bytes` bytes of CSPRNG output.
#[must_use]
pub fn new_token(bytes: usize) -> PlainToken {
    let mut buf = vec![0u8; bytes];
    rand::rng().fill_bytes(&mut buf);
    PlainToken(URL_SAFE_NO_PAD.encode(&buf))
}
