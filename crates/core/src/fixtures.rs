//! Seed data for the demo catalog and the demo shopper.

use rust_decimal::Decimal;

use crate::domain::account::{Address, PaymentMethod, UserAccount, UserId};
use crate::domain::cart::ItemId;
use crate::domain::inventory::InventoryItem;

fn strings(values: &[&str]) -> Option<Vec<String>> {
    Some(values.iter().map(|value| value.to_string()).collect())
}

fn item(
    id: &str,
    name: &str,
    cents: i64,
    category: &str,
    description: &str,
    stock: u32,
) -> InventoryItem {
    InventoryItem {
        id: ItemId(id.to_string()),
        name: name.to_string(),
        price: Decimal::new(cents, 2),
        category: category.to_string(),
        description: description.to_string(),
        stock,
        colors: None,
        sizes: None,
    }
}

pub fn seed_inventory() -> Vec<InventoryItem> {
    vec![
        InventoryItem {
            colors: strings(&["Black", "White", "Navy", "Red"]),
            ..item("1", "Classic T-Shirt", 1999, "Clothing", "A comfortable cotton t-shirt in various colors", 50)
        },
        InventoryItem {
            sizes: strings(&["28", "30", "32", "34", "36"]),
            ..item("2", "Slim Fit Jeans", 4999, "Clothing", "Modern slim fit jeans with stretch fabric", 30)
        },
        InventoryItem {
            sizes: strings(&["7", "8", "9", "10", "11"]),
            ..item("3", "Running Sneakers", 7999, "Footwear", "Lightweight running shoes with cushioning", 25)
        },
        InventoryItem {
            colors: strings(&["Brown", "Black"]),
            ..item("4", "Leather Wallet", 2999, "Accessories", "Genuine leather wallet with multiple card slots", 40)
        },
        InventoryItem {
            sizes: strings(&["S", "M", "L", "XL"]),
            ..item("5", "Denim Jacket", 5999, "Clothing", "Classic denim jacket with brass buttons", 20)
        },
        InventoryItem {
            colors: strings(&["Black", "Silver", "Rose Gold"]),
            ..item("6", "Smart Watch", 19999, "Electronics", "Fitness tracking smartwatch with heart rate monitor", 15)
        },
        InventoryItem {
            colors: strings(&["Navy", "Gray", "Black"]),
            ..item("7", "Backpack", 3999, "Accessories", "Water-resistant backpack with laptop sleeve", 35)
        },
        InventoryItem {
            colors: strings(&["Black", "Tortoise", "Silver"]),
            ..item("8", "Sunglasses", 8999, "Accessories", "Polarized UV protection sunglasses", 45)
        },
        InventoryItem {
            sizes: strings(&["S", "M", "L", "XL"]),
            colors: strings(&["Gray", "Black", "Navy"]),
            ..item("9", "Hooded Sweatshirt", 3499, "Clothing", "Comfortable cotton blend hoodie", 40)
        },
        InventoryItem {
            colors: strings(&["White", "Black", "Blue"]),
            ..item("10", "Wireless Earbuds", 12999, "Electronics", "True wireless earbuds with noise cancellation", 30)
        },
    ]
}

pub fn seed_users() -> Vec<UserAccount> {
    vec![UserAccount {
        user_id: UserId("user1".to_string()),
        email: "user1@example.com".to_string(),
        wallet: vec![
            PaymentMethod {
                id: "1".to_string(),
                kind: "credit".to_string(),
                last4: "1234".to_string(),
                exp: "12/25".to_string(),
            },
            PaymentMethod {
                id: "2".to_string(),
                kind: "debit".to_string(),
                last4: "5678".to_string(),
                exp: "03/26".to_string(),
            },
        ],
        addresses: vec![Address {
            id: "1".to_string(),
            kind: "shipping".to_string(),
            street: "123 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            zip: "62701".to_string(),
        }],
    }]
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{seed_inventory, seed_users};

    #[test]
    fn inventory_ids_are_unique() {
        let inventory = seed_inventory();
        let ids: HashSet<_> = inventory.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids.len(), 10);
    }

    #[test]
    fn demo_user_resolves_by_email() {
        let users = seed_users();
        assert!(users[0].matches("USER1@example.com"));
        assert_eq!(users[0].payment_method("2").map(|m| m.last4.as_str()), Some("5678"));
    }
}
