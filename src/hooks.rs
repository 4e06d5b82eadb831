//! Re-encryption hooks for secrets stored outside the account list
//!
//! Modules that keep their own encrypted secrets register a hook. When the
//! master passphrase changes, every hook is called with the old and the new
//! passphrase and re-encrypts its own storage.

use crate::error::{ErrorKind, PassvaultError, Result};
use tracing::{debug, warn};

/// A participant in bulk re-encryption.
pub trait PluginSecretHook {
    fn reencrypt(&mut self, old_passphrase: &str, new_passphrase: &str) -> Result<()>;
}

impl<F> PluginSecretHook for F
where
    F: FnMut(&str, &str) -> Result<()>,
{
    fn reencrypt(&mut self, old_passphrase: &str, new_passphrase: &str) -> Result<()> {
        self(old_passphrase, new_passphrase)
    }
}

/// A hook that returned an error.
#[derive(Debug)]
pub struct HookFailure {
    pub name: String,
    pub error: PassvaultError,
}

/// Registered hooks, called in registration order.
#[derive(Default)]
pub struct PluginHookRegistry {
    hooks: Vec<(String, Box<dyn PluginSecretHook>)>,
}

impl PluginHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, hook: impl PluginSecretHook + 'static) {
        let name = name.into();
        debug!("registering secret hook {}", name);
        self.hooks.push((name, Box::new(hook)));
    }

    /// Remove the hook registered under `name`. Returns whether one was found.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(n, _)| n != name);
        self.hooks.len() != before
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Call every hook. A failing hook does not stop the others.
    pub fn invoke_all(&mut self, old_passphrase: &str, new_passphrase: &str) -> Vec<HookFailure> {
        let mut failures = Vec::new();
        for (name, hook) in &mut self.hooks {
            if let Err(error) = hook.reencrypt(old_passphrase, new_passphrase) {
                warn!("secret hook {} failed to re-encrypt: {}", name, error);
                failures.push(HookFailure {
                    name: name.clone(),
                    error: PassvaultError::with_kind_and_source(
                        error.category,
                        ErrorKind::HookFailed,
                        format!("secret hook {} failed to re-encrypt", name),
                        error,
                    ),
                });
            }
        }
        failures
    }
}
