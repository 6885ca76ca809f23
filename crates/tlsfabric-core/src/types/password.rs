//! Keystore/PKCS12 protection password.

use serde::Deserialize;
use std::fmt;

/// Development-only default. Every JVM keystore tool ships with it as its
/// own default, which is exactly why it must not reach production.
const DEV_DEFAULT: &str = "changeit";

/// Password protecting PKCS12 archives and Java keystores.
///
/// `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct KeystorePassword(String);

impl KeystorePassword {
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    /// The well-known development default (`changeit`).
    #[must_use]
    pub fn dev_default() -> Self {
        Self(DEV_DEFAULT.to_string())
    }

    #[must_use]
    pub fn is_dev_default(&self) -> bool {
        self.0 == DEV_DEFAULT
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The raw password, for handing to an external tool.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeystorePassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeystorePassword(<redacted>)")
    }
}
