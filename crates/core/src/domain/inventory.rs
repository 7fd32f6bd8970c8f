use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::cart::{CartItem, ItemId};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: ItemId,
    pub name: String,
    pub price: Decimal,
    pub category: String,
    pub description: String,
    pub stock: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub colors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<String>>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub name: String,
    pub in_stock: bool,
    pub stock_count: u32,
}

impl InventoryItem {
    pub fn availability(&self) -> Availability {
        Availability { name: self.name.clone(), in_stock: self.stock > 0, stock_count: self.stock }
    }

    pub fn matches_query(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        self.name.to_lowercase().contains(&query) || self.category.to_lowercase().contains(&query)
    }

    pub fn in_category(&self, category: &str) -> bool {
        self.category.eq_ignore_ascii_case(category.trim())
    }

    /// Freezes the descriptive fields of this item into a cart line.
    pub fn snapshot(&self, quantity: u32) -> CartItem {
        let mut attributes = BTreeMap::new();
        attributes.insert("description".to_string(), Value::from(self.description.clone()));
        attributes.insert("category".to_string(), Value::from(self.category.clone()));
        attributes.insert("stock".to_string(), Value::from(self.stock));
        if let Some(colors) = &self.colors {
            attributes.insert("colors".to_string(), Value::from(colors.clone()));
        }
        if let Some(sizes) = &self.sizes {
            attributes.insert("sizes".to_string(), Value::from(sizes.clone()));
        }

        CartItem {
            item_id: self.id.clone(),
            name: self.name.clone(),
            price: self.price,
            quantity,
            attributes,
        }
    }
}
