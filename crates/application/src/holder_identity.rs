use std::env;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use datatag_core::{AppResult, NonEmptyString};

const UNKNOWN_HOST: &str = "unknown-host";

/// Token identifying one lock owner.
///
/// Generated tokens have the shape `<host>-<uuid>` and are unique per
/// process instance. The value never changes once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HolderIdentity(Arc<str>);

impl HolderIdentity {
    /// Generates a fresh token from the host name and a random suffix.
    #[must_use]
    pub fn generate() -> Self {
        let suffix = uuid::Uuid::new_v4().simple();
        Self(Arc::from(format!("{}-{suffix}", host_name())))
    }

    /// Binds an explicit token, e.g. to take over the identity of a dead node.
    pub fn from_token(token: impl Into<String>) -> AppResult<Self> {
        let token = NonEmptyString::new(token)?;
        Ok(Self(Arc::from(String::from(token))))
    }

    /// Returns the token string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for HolderIdentity {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(&self.0)
    }
}

fn host_name() -> String {
    env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| UNKNOWN_HOST.to_owned())
}
