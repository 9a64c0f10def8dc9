//! `Keystore` implementation backed by environment variables.
//!
//! Suitable for a single-operator deployment: `user_id` is accepted (to
//! satisfy the `Keystore` contract) but otherwise ignored, since there is
//! exactly one set of venue credentials per process. A multi-tenant
//! deployment would replace this with a store keyed by `user_id`, the
//! same way `fra-persistence::InMemoryRepository` stands in for a
//! conforming database-backed `Repository`.

use fra_core::error::Result;
use fra_core::ids::Venue;
use fra_core::repository::{ApiCredential, Keystore};
use zeroize::Zeroizing;

/// Reads `FRA_<VENUE>_API_KEY` / `FRA_<VENUE>_API_SECRET` /
/// `FRA_<VENUE>_PASSPHRASE` (venue name upper-cased) for each venue the
/// engine is configured to trade on.
pub struct EnvKeystore;

impl EnvKeystore {
    pub fn new() -> Self {
        Self
    }

    fn env_var(venue: &Venue, suffix: &str) -> Option<String> {
        let key = format!("FRA_{}_{}", venue.as_str().to_uppercase(), suffix);
        std::env::var(key).ok()
    }
}

impl Default for EnvKeystore {
    fn default() -> Self {
        Self::new()
    }
}

impl Keystore for EnvKeystore {
    async fn decrypt_credential(
        &self,
        _user_id: &str,
        venue: &Venue,
        _purpose: &str,
    ) -> Result<Option<ApiCredential>> {
        let (Some(api_key), Some(api_secret)) =
            (Self::env_var(venue, "API_KEY"), Self::env_var(venue, "API_SECRET"))
        else {
            return Ok(None);
        };
        let passphrase = Self::env_var(venue, "PASSPHRASE").map(Zeroizing::new);

        Ok(Some(ApiCredential {
            venue: venue.clone(),
            api_key: Zeroizing::new(api_key),
            api_secret: Zeroizing::new(api_secret),
            passphrase,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_credentials_return_none() {
        let keystore = EnvKeystore::new();
        let venue = Venue::new("a-venue-nobody-sets-env-vars-for");
        let result = keystore.decrypt_credential("u1", &venue, "test").await.unwrap();
        assert!(result.is_none());
    }
}
