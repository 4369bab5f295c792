//! Account registry: immutable per-account configuration, loaded at startup.

use std::collections::HashMap;

use crate::config::AccountConfig;

/// Read-only lookup of configured accounts by exchange index.
#[derive(Debug)]
pub struct AccountRegistry {
    l1_address: String,
    accounts: HashMap<u32, AccountConfig>,
}

impl AccountRegistry {
    pub fn new(l1_address: impl Into<String>, accounts: Vec<AccountConfig>) -> Self {
        let accounts = accounts.into_iter().map(|a| (a.index, a)).collect();
        Self {
            l1_address: l1_address.into(),
            accounts,
        }
    }

    pub fn l1_address(&self) -> &str {
        &self.l1_address
    }

    pub fn get(&self, account_index: u32) -> Option<&AccountConfig> {
        self.accounts.get(&account_index)
    }

    pub fn contains(&self, account_index: u32) -> bool {
        self.accounts.contains_key(&account_index)
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
