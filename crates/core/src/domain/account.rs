use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub last4: String,
    pub exp: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    pub user_id: UserId,
    pub email: String,
    pub wallet: Vec<PaymentMethod>,
    pub addresses: Vec<Address>,
}

impl UserAccount {
    /// Matches either the user id or the email (case-insensitive).
    pub fn matches(&self, identifier: &str) -> bool {
        let identifier = identifier.trim();
        self.user_id.0 == identifier || self.email.eq_ignore_ascii_case(identifier)
    }

    pub fn payment_method(&self, method_id: &str) -> Option<&PaymentMethod> {
        self.wallet.iter().find(|method| method.id == method_id)
    }

    pub fn address(&self, address_id: &str) -> Option<&Address> {
        self.addresses.iter().find(|address| address.id == address_id)
    }
}
