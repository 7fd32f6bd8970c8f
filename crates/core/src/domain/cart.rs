use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub String);

impl ItemId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One line of the shopping cart.
///
/// Price and descriptive fields are a snapshot taken when the item was added;
/// they are never re-validated against the catalog afterwards. Anything the
/// catalog attached beyond the core fields (category, colors, sizes, ...) is
/// carried in `attributes` and flattened on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub item_id: ItemId,
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

impl CartItem {
    pub fn new(item_id: impl Into<String>, name: impl Into<String>, price: Decimal, quantity: u32) -> Self {
        Self {
            item_id: ItemId(item_id.into()),
            name: name.into(),
            price,
            quantity,
            attributes: BTreeMap::new(),
        }
    }

    pub fn line_total(&self) -> Decimal {
        self.price * Decimal::from(self.quantity)
    }
}

pub fn cart_total(items: &[CartItem]) -> Decimal {
    items.iter().map(CartItem::line_total).sum()
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use serde_json::json;

    use super::{cart_total, CartItem};

    #[test]
    fn total_multiplies_price_by_quantity() {
        let items = vec![
            CartItem::new("1", "Classic T-Shirt", Decimal::new(1999, 2), 2),
            CartItem::new("4", "Leather Wallet", Decimal::new(2999, 2), 1),
        ];

        assert_eq!(cart_total(&items), Decimal::new(6997, 2));
        assert_eq!(cart_total(&[]), Decimal::ZERO);
    }

    #[test]
    fn extra_catalog_fields_land_in_attributes() {
        let item: CartItem = serde_json::from_value(json!({
            "item_id": "1",
            "name": "Classic T-Shirt",
            "price": 19.99,
            "quantity": 1,
            "category": "Clothing",
            "colors": ["Black", "White"]
        }))
        .expect("cart item should decode");

        assert_eq!(item.price, Decimal::new(1999, 2));
        assert_eq!(item.attributes.get("category"), Some(&json!("Clothing")));
        assert_eq!(item.attributes.len(), 2);
    }
}
