use std::env;
use std::fmt;

use rand::Rng;
use sha2::{Digest, Sha256};

/// Environment slots read for the rotation pool, in pool order.
pub const CREDENTIAL_SLOTS: &[&str] = &[
    "GEMINI_API_KEY_1",
    "GEMINI_API_KEY_2",
    "GEMINI_API_KEY_3",
    "GEMINI_API_KEY_4",
    "GEMINI_API_KEY",
    "API_KEY",
];

pub const SETTINGS_SLOT: &str = "settings";

pub const NO_CREDENTIALS_MESSAGE: &str =
    "No API key configured. Set GEMINI_API_KEY_1..4 or save a key with /key <api-key>.";

#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    slot: String,
    secret: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("slot", &self.slot)
            .field("secret", &"<REDACTED>")
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

impl Credential {
    pub fn new(slot: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            secret: secret.into(),
        }
    }

    pub fn slot(&self) -> &str {
        &self.slot
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    /// Short SHA-256 digest, safe to log.
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.secret.as_bytes());
        hex::encode(&digest[..6])
    }
}

pub fn is_usable_secret(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    let upper = trimmed.to_ascii_uppercase();
    if matches!(upper.as_str(), "UNDEFINED" | "NULL" | "NONE" | "CHANGEME") {
        return false;
    }
    !(upper.contains("PLACEHOLDER") || upper.contains("YOUR_API_KEY") || upper.contains("YOUR-API-KEY"))
}

/// Raw values of the environment credential slots, in slot order.
pub fn env_slots() -> Vec<(String, Option<String>)> {
    CREDENTIAL_SLOTS
        .iter()
        .map(|slot| ((*slot).to_string(), env::var(slot).ok()))
        .collect()
}

/// Ordered, de-duplicated set of usable credentials. Never mutated after
/// construction; a settings change builds a new pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialPool {
    credentials: Vec<Credential>,
}

impl CredentialPool {
    pub fn from_slots<I, S>(slots: I) -> Self
    where
        I: IntoIterator<Item = (S, Option<String>)>,
        S: Into<String>,
    {
        let mut credentials: Vec<Credential> = Vec::new();
        for (slot, value) in slots {
            let Some(value) = value else {
                continue;
            };
            if !is_usable_secret(&value) {
                continue;
            }
            let secret = value.trim().to_string();
            if credentials.iter().any(|existing| existing.secret == secret) {
                continue;
            }
            credentials.push(Credential::new(slot, secret));
        }
        Self { credentials }
    }

    /// Environment slots first, then the key saved in settings.
    pub fn from_env(settings_key: Option<&str>) -> Self {
        Self::with_settings_key(env_slots(), settings_key)
    }

    pub fn with_settings_key(
        mut slots: Vec<(String, Option<String>)>,
        settings_key: Option<&str>,
    ) -> Self {
        slots.push((SETTINGS_SLOT.to_string(), settings_key.map(str::to_string)));
        Self::from_slots(slots)
    }

    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.credentials.get(index)
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    pub fn slots(&self) -> Vec<String> {
        self.credentials
            .iter()
            .map(|credential| credential.slot.clone())
            .collect()
    }
}

/// Chooses the credential for a new client. `None` only for an empty pool.
pub trait CredentialPicker: Send {
    fn pick<'a>(&mut self, pool: &'a CredentialPool) -> Option<&'a Credential>;
}

/// Uniform random choice. Does not remember which credentials were
/// exhausted, so a rotation may land on the same key again.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomPicker;

impl CredentialPicker for RandomPicker {
    fn pick<'a>(&mut self, pool: &'a CredentialPool) -> Option<&'a Credential> {
        if pool.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..pool.len());
        pool.get(index)
    }
}

/// Walks the pool in order, wrapping around.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobinPicker {
    next: usize,
}

impl RoundRobinPicker {
    pub fn starting_at(next: usize) -> Self {
        Self { next }
    }
}

impl CredentialPicker for RoundRobinPicker {
    fn pick<'a>(&mut self, pool: &'a CredentialPool) -> Option<&'a Credential> {
        if pool.is_empty() {
            return None;
        }
        let index = self.next % pool.len();
        self.next = index + 1;
        pool.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_usable_secret, Credential, CredentialPicker, CredentialPool, RandomPicker,
        RoundRobinPicker,
    };

    fn pool(values: &[Option<&str>]) -> CredentialPool {
        CredentialPool::from_slots(
            values
                .iter()
                .enumerate()
                .map(|(idx, value)| (format!("slot_{idx}"), value.map(str::to_string))),
        )
    }

    #[test]
    fn loader_drops_blank_placeholder_and_duplicate_entries() {
        let loaded = pool(&[
            Some("k1"),
            None,
            Some("   "),
            Some("undefined"),
            Some("PLACEHOLDER_API_KEY"),
            Some(" k2 "),
            Some("k1"),
        ]);
        let secrets: Vec<&str> = loaded
            .credentials()
            .iter()
            .map(Credential::secret)
            .collect();
        assert_eq!(secrets, vec!["k1", "k2"]);
        assert_eq!(loaded.slots(), vec!["slot_0", "slot_5"]);
    }

    #[test]
    fn placeholder_detection() {
        assert!(is_usable_secret("AIzaSyA-real-looking"));
        assert!(!is_usable_secret("your_api_key_here"));
        assert!(!is_usable_secret("null"));
        assert!(!is_usable_secret(""));
    }

    #[test]
    fn random_picker_always_returns_a_pool_member() {
        let loaded = pool(&[Some("k1"), Some("k2"), Some("k3")]);
        let mut picker = RandomPicker;
        for _ in 0..200 {
            let picked = picker.pick(&loaded).map(|credential| credential.secret().to_string());
            let picked = picked.unwrap_or_default();
            assert!(["k1", "k2", "k3"].contains(&picked.as_str()));
        }
    }

    #[test]
    fn pickers_return_none_for_empty_pool() {
        let empty = CredentialPool::default();
        assert!(RandomPicker.pick(&empty).is_none());
        assert!(RoundRobinPicker::default().pick(&empty).is_none());
    }

    #[test]
    fn round_robin_wraps() {
        let loaded = pool(&[Some("k1"), Some("k2")]);
        let mut picker = RoundRobinPicker::starting_at(1);
        let order: Vec<String> = (0..3)
            .filter_map(|_| picker.pick(&loaded).map(|c| c.secret().to_string()))
            .collect();
        assert_eq!(order, vec!["k2", "k1", "k2"]);
    }

    #[test]
    fn debug_output_redacts_secret() {
        let credential = Credential::new("GEMINI_API_KEY_1", "super-secret");
        let debug = format!("{credential:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<REDACTED>"));
        assert_eq!(credential.fingerprint().len(), 12);
    }

    #[test]
    fn settings_key_joins_after_environment_slots() {
        let env = vec![
            ("GEMINI_API_KEY_1".to_string(), Some("k1".to_string())),
            ("API_KEY".to_string(), None),
        ];
        let loaded = CredentialPool::with_settings_key(env.clone(), Some("k-saved"));
        assert_eq!(loaded.slots(), vec!["GEMINI_API_KEY_1", "settings"]);

        let duplicate = CredentialPool::with_settings_key(env, Some(" k1 "));
        assert_eq!(duplicate.len(), 1);
    }
}
