use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use storefront_core::domain::capability::{names, Capability};
use storefront_core::domain::cart::CartItem;
use storefront_core::domain::inventory::InventoryItem;
use storefront_core::fixtures::seed_inventory;

use crate::server::{cart_result, CapabilityHandler};
use crate::tools::{capability, parse_args, to_json, NoArguments};
use crate::McpError;

/// Read-only item store, constructed once at startup.
#[derive(Clone, Debug, Default)]
pub struct InventoryRepository {
    items: Vec<InventoryItem>,
}

impl InventoryRepository {
    pub fn new(items: Vec<InventoryItem>) -> Self {
        Self { items }
    }

    pub fn all(&self) -> &[InventoryItem] {
        &self.items
    }

    pub fn get(&self, item_id: &str) -> Result<&InventoryItem, McpError> {
        self.items
            .iter()
            .find(|item| item.id.as_str() == item_id)
            .ok_or_else(|| McpError::ItemNotFound(item_id.to_string()))
    }

    pub fn search(&self, query: &str) -> Vec<&InventoryItem> {
        self.items.iter().filter(|item| item.matches_query(query)).collect()
    }

    pub fn by_category(&self, category: &str) -> Vec<&InventoryItem> {
        self.items.iter().filter(|item| item.in_category(category)).collect()
    }
}

/// The single shopper's cart. Lines are merged by item id.
#[derive(Clone, Debug, Default)]
pub struct CartRepository {
    lines: Vec<CartItem>,
}

impl CartRepository {
    pub fn lines(&self) -> &[CartItem] {
        &self.lines
    }

    /// Adds `quantity` of `item`, snapshotting its descriptive fields on
    /// first add. Stock is checked against the merged quantity.
    pub fn add(&mut self, item: &InventoryItem, quantity: u32) -> Result<(), McpError> {
        if quantity == 0 {
            return Err(McpError::InvalidQuantity);
        }

        let existing = self.lines.iter().position(|line| line.item_id == item.id);
        let already = existing.map(|index| self.lines[index].quantity).unwrap_or(0);
        let wanted = already.saturating_add(quantity);
        if wanted > item.stock {
            return Err(McpError::InsufficientStock { available: item.stock.saturating_sub(already) });
        }

        match existing {
            Some(index) => self.lines[index].quantity = wanted,
            None => self.lines.push(item.snapshot(quantity)),
        }
        Ok(())
    }

    pub fn remove(&mut self, item_id: &str) -> Result<CartItem, McpError> {
        let index = self
            .lines
            .iter()
            .position(|line| line.item_id.as_str() == item_id)
            .ok_or_else(|| McpError::NotInCart(item_id.to_string()))?;
        Ok(self.lines.remove(index))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ItemLookup {
    /// The ID of the item
    item_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchQuery {
    /// Text matched against item names and categories
    query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CategoryQuery {
    /// Category name, e.g. Clothing or Electronics
    category: String,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize, JsonSchema)]
struct AddToCart {
    /// The ID of the item to add
    item_id: String,
    /// How many to add
    #[serde(default = "default_quantity")]
    quantity: u32,
}

pub struct CatalogHandler {
    inventory: InventoryRepository,
    cart: CartRepository,
}

impl CatalogHandler {
    pub fn new(inventory: InventoryRepository) -> Self {
        Self { inventory, cart: CartRepository::default() }
    }

    pub fn seeded() -> Self {
        Self::new(InventoryRepository::new(seed_inventory()))
    }

    pub fn cart(&self) -> &CartRepository {
        &self.cart
    }

    fn cart_json(&self) -> Result<Value, McpError> {
        to_json(&self.cart.lines())
    }
}

impl CapabilityHandler for CatalogHandler {
    fn server_name(&self) -> &'static str {
        "catalog"
    }

    fn instructions(&self) -> Option<&'static str> {
        Some("Browse the store inventory and manage the shopping cart.")
    }

    fn capabilities(&self) -> Vec<Capability> {
        vec![
            capability::<NoArguments>("list_items", "List all available items in the inventory."),
            capability::<ItemLookup>("get_item", "Get details of a specific item."),
            capability::<SearchQuery>(
                names::SEARCH_ITEMS,
                "Search items by name or category (case-insensitive).",
            ),
            capability::<CategoryQuery>(
                "get_items_by_category",
                "List all items in a category.",
            ),
            capability::<ItemLookup>(
                "get_item_availability",
                "Check whether an item is in stock and how many are left.",
            ),
            capability::<AddToCart>(
                names::ADD_TO_CART,
                "Add an item to the shopping cart. Quantity defaults to 1.",
            ),
            capability::<NoArguments>(names::GET_CART, "Get the current shopping cart."),
            capability::<ItemLookup>(names::REMOVE_FROM_CART, "Remove an item from the cart."),
            capability::<NoArguments>(names::CLEAR_CART, "Remove every item from the cart."),
        ]
    }

    fn invoke(&mut self, name: &str, arguments: Map<String, Value>) -> Result<Value, McpError> {
        match name {
            "list_items" => to_json(&self.inventory.all()),
            "get_item" => {
                let input: ItemLookup = parse_args(name, arguments)?;
                to_json(self.inventory.get(&input.item_id)?)
            }
            names::SEARCH_ITEMS => {
                let input: SearchQuery = parse_args(name, arguments)?;
                to_json(&self.inventory.search(&input.query))
            }
            "get_items_by_category" => {
                let input: CategoryQuery = parse_args(name, arguments)?;
                to_json(&self.inventory.by_category(&input.category))
            }
            "get_item_availability" => {
                let input: ItemLookup = parse_args(name, arguments)?;
                to_json(&self.inventory.get(&input.item_id)?.availability())
            }
            names::ADD_TO_CART => {
                let input: AddToCart = parse_args(name, arguments)?;
                let item = self.inventory.get(&input.item_id)?;
                self.cart.add(item, input.quantity)?;
                Ok(cart_result(format!("Added {} to cart", item.name), self.cart_json()?))
            }
            names::GET_CART => self.cart_json(),
            names::REMOVE_FROM_CART => {
                let input: ItemLookup = parse_args(name, arguments)?;
                let removed = self.cart.remove(&input.item_id)?;
                Ok(cart_result(format!("Removed {} from cart", removed.name), self.cart_json()?))
            }
            names::CLEAR_CART => {
                self.cart.clear();
                Ok(cart_result("Cart cleared".to_string(), self.cart_json()?))
            }
            other => Err(McpError::UnknownCapability(other.to_string())),
        }
    }
}
