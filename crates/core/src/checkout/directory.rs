use crate::domain::account::UserAccount;

/// Read access to known shoppers, keyed by user id or email.
pub trait UserDirectory: Send + Sync {
    fn find(&self, identifier: &str) -> Option<UserAccount>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryUserDirectory {
    users: Vec<UserAccount>,
}

impl InMemoryUserDirectory {
    pub fn new(users: Vec<UserAccount>) -> Self {
        Self { users }
    }

    pub fn users(&self) -> &[UserAccount] {
        &self.users
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn find(&self, identifier: &str) -> Option<UserAccount> {
        self.users.iter().find(|user| user.matches(identifier)).cloned()
    }
}
