pub mod account;
pub mod capability;
pub mod cart;
pub mod checkout;
pub mod inventory;
