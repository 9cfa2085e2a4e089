//! The per-session configuration+resource carrier threaded into every tool
//! invocation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::sandbox::SandboxLimits;

/// Owned exclusively by the REPL dispatcher; tools receive immutable
/// borrows except at the well-defined mutation points (pagination advance,
/// `auto_confirm` toggle). Cloning is cheap — the fields that need
/// interior mutability are already `Arc`-wrapped.
#[derive(Clone)]
pub struct DepsBundle {
    /// Resource/timeout policy in effect for the session's sandbox.
    pub limits: SandboxLimits,
    /// Session-scoped "yolo" flag: when set, the approval cycle approves
    /// every deferred request without prompting. Single writer: the
    /// approval cycle, on receiving `"a"` from `prompt_approval`.
    auto_confirm: Arc<AtomicBool>,
    /// Mutable pagination cursors, keyed by a tool-chosen cursor name.
    /// Single-writer-per-key discipline: each tool only ever touches its
    /// own key.
    pagination_tokens: Arc<Mutex<HashMap<String, String>>>,
}

impl DepsBundle {
    /// Create a new bundle with the given limits and `auto_confirm` unset.
    #[must_use]
    pub fn new(limits: SandboxLimits) -> Self {
        Self {
            limits,
            auto_confirm: Arc::new(AtomicBool::new(false)),
            pagination_tokens: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Current value of the session yolo flag.
    #[must_use]
    pub fn auto_confirm(&self) -> bool {
        self.auto_confirm.load(Ordering::Relaxed)
    }

    /// Set the session yolo flag. Called by the approval cycle on `"a"`,
    /// or toggled by the `/yolo` slash command.
    pub fn set_auto_confirm(&self, value: bool) {
        self.auto_confirm.store(value, Ordering::Relaxed);
    }

    /// Toggle the session yolo flag, returning the new value.
    pub fn toggle_auto_confirm(&self) -> bool {
        let new = !self.auto_confirm();
        self.set_auto_confirm(new);
        new
    }

    /// Read a pagination cursor by name.
    pub async fn pagination_token(&self, key: &str) -> Option<String> {
        self.pagination_tokens.lock().await.get(key).cloned()
    }

    /// Advance a pagination cursor by name.
    pub async fn set_pagination_token(&self, key: impl Into<String>, value: impl Into<String>) {
        self.pagination_tokens
            .lock()
            .await
            .insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_confirm_toggle_flips_state() {
        let deps = DepsBundle::new(SandboxLimits::default());
        assert!(!deps.auto_confirm());
        assert!(deps.toggle_auto_confirm());
        assert!(deps.auto_confirm());
        assert!(!deps.toggle_auto_confirm());
    }

    #[tokio::test]
    async fn pagination_token_roundtrips() {
        let deps = DepsBundle::new(SandboxLimits::default());
        assert!(deps.pagination_token("drive").await.is_none());
        deps.set_pagination_token("drive", "cursor-1").await;
        assert_eq!(
            deps.pagination_token("drive").await,
            Some("cursor-1".to_owned())
        );
    }

    #[test]
    fn clone_shares_auto_confirm_state() {
        let deps = DepsBundle::new(SandboxLimits::default());
        let clone = deps.clone();
        deps.set_auto_confirm(true);
        assert!(clone.auto_confirm());
    }
}
