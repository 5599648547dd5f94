use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::models::InitiationCode;

const CODE_PREFIX: &str = "CORR";

/// key: settlement-code-registry -> issue and consume one-time codes
#[derive(Clone, Default)]
pub struct InitiationCodeRegistry {
    codes: Arc<DashMap<String, InitiationCode>>,
}

impl InitiationCodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&self) -> InitiationCode {
        loop {
            let now = Utc::now();
            let suffix = Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase();
            let code = format!("{CODE_PREFIX}{}{suffix}", now.format("%Y%m%d%H%M%S"));
            let entry = InitiationCode {
                code: code.clone(),
                issued_at: now,
                used: false,
            };
            // re-roll on a same-second suffix collision
            if let dashmap::mapref::entry::Entry::Vacant(slot) = self.codes.entry(code) {
                slot.insert(entry.clone());
                tracing::debug!(code = %entry.code, "initiation code issued");
                return entry;
            }
        }
    }

    /// Consumes `code`. Only one caller can ever observe `true` for a given code.
    pub fn mark_used(&self, code: &str) -> bool {
        match self.codes.get_mut(code) {
            Some(mut entry) if !entry.used => {
                entry.used = true;
                true
            }
            _ => false,
        }
    }

    pub fn is_issued_unused(&self, code: &str) -> bool {
        self.codes.get(code).map(|entry| !entry.used).unwrap_or(false)
    }

    pub fn get(&self, code: &str) -> Option<InitiationCode> {
        self.codes.get(code).map(|entry| entry.clone())
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn issued_codes_follow_the_corr_layout_and_are_unique() {
        let registry = InitiationCodeRegistry::new();
        let codes: HashSet<String> = (0..500).map(|_| registry.issue().code).collect();
        assert_eq!(codes.len(), 500);
        assert_eq!(registry.len(), 500);
        for code in &codes {
            assert!(code.starts_with("CORR"));
            assert_eq!(code.len(), 4 + 14 + 8);
            assert!(code[4..18].chars().all(|c| c.is_ascii_digit()));
            assert!(code[18..]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn mark_used_succeeds_exactly_once() {
        let registry = InitiationCodeRegistry::new();
        let code = registry.issue().code;
        assert!(registry.is_issued_unused(&code));
        assert!(registry.mark_used(&code));
        assert!(!registry.mark_used(&code));
        assert!(!registry.mark_used(&code));
        assert!(registry.get(&code).unwrap().used);
        assert!(!registry.mark_used("CORR00000000000000UNKNOWN"));
    }

    #[test]
    fn racing_callers_resolve_to_one_winner() {
        let registry = InitiationCodeRegistry::new();
        let code = registry.issue().code;
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let registry = registry.clone();
                let code = code.clone();
                thread::spawn(move || registry.mark_used(&code))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
