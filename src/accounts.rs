//! Host account lookup

use nix::unistd::User;

use crate::config::ConfigError;

/// An OS account as seen by the passwd database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
}

/// Source of account information
pub trait AccountDirectory {
    /// Look up an account by name. `Ok(None)` means the account does not exist.
    fn lookup(&self, name: &str) -> Result<Option<Account>, ConfigError>;
}

/// Accounts of the running host (getpwnam)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemAccounts;

impl AccountDirectory for SystemAccounts {
    fn lookup(&self, name: &str) -> Result<Option<Account>, ConfigError> {
        let user = User::from_name(name).map_err(|e| ConfigError::AccountLookup {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        Ok(user.map(|user| Account {
            name: user.name,
            uid: user.uid.as_raw(),
            gid: user.gid.as_raw(),
        }))
    }
}

/// Fixed in-memory account table
#[cfg(test)]
#[derive(Debug, Default)]
pub struct StaticAccounts {
    accounts: std::collections::HashMap<String, Account>,
}

#[cfg(test)]
impl StaticAccounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(mut self, name: &str, uid: u32, gid: u32) -> Self {
        self.accounts.insert(
            name.to_string(),
            Account {
                name: name.to_string(),
                uid,
                gid,
            },
        );
        self
    }
}

#[cfg(test)]
impl AccountDirectory for StaticAccounts {
    fn lookup(&self, name: &str) -> Result<Option<Account>, ConfigError> {
        Ok(self.accounts.get(name).cloned())
    }
}
