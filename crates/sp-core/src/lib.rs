//! Core domain entities, rules, and traits for Stockpile.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sp_utils::names_match;
use thiserror::Error;
use tracing::{info, warn};

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors returned by core validation and domain rules.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Returned when a validation rule is violated.
    #[error("validation error: {0}")]
    Validation(String),
    /// Returned when store operations fail.
    #[error("storage error: {0}")]
    Storage(String),
    /// Returned when an operation targets an id that does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl CoreError {
    /// The human-readable part of the error, without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(message) | Self::Storage(message) | Self::NotFound(message) => {
                message
            }
        }
    }
}

/// Identifier shared by categories, items, and variants.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct Id(u64);

impl Id {
    /// Wrap a raw identifier value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Access the raw identifier value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hands out distinct identifiers derived from the wall clock in
/// milliseconds. Two calls within the same millisecond still differ because
/// every id is at least one past the previous one.
#[derive(Clone, Debug, Default)]
pub struct IdGenerator {
    last: u64,
}

impl IdGenerator {
    /// Make sure future ids never collide with `id`.
    pub fn observe(&mut self, id: Id) {
        self.last = self.last.max(id.0);
    }

    /// Produce the next identifier.
    pub fn next_id(&mut self) -> Id {
        let now = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        let next = now.max(self.last.saturating_add(1));
        self.last = next;
        Id(next)
    }
}

/// A top-level grouping of items.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Category {
    /// Unique identifier.
    pub id: Id,
    /// Display name, unique across categories ignoring case.
    pub name: String,
}

/// A concrete configuration of an item.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct Variant {
    /// Unique identifier.
    pub id: Id,
    /// Color label.
    pub color: String,
    /// Price as entered; only display formatting interprets it.
    pub price: String,
    /// Quantity as entered.
    pub qty: String,
}

impl Variant {
    /// Create a variant, trimming every field and rejecting empty ones.
    pub fn new(id: Id, color: &str, price: &str, qty: &str) -> CoreResult<Self> {
        let (color, price, qty) =
            variant_fields(color, price, qty).ok_or_else(missing_variant_fields)?;
        Ok(Self {
            id,
            color,
            price,
            qty,
        })
    }
}

/// A named product type owned by one category.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Unique identifier.
    pub id: Id,
    /// Display name, unique within its category ignoring case.
    pub name: String,
    /// Owning category.
    pub cat_id: Id,
    /// Embedded variants in display order.
    #[serde(default)]
    pub variants: Vec<Variant>,
}

fn missing_variant_fields() -> CoreError {
    CoreError::Validation("All variant fields are required.".into())
}

fn variant_fields(color: &str, price: &str, qty: &str) -> Option<(String, String, String)> {
    let (color, price, qty) = (color.trim(), price.trim(), qty.trim());
    if color.is_empty() || price.is_empty() || qty.is_empty() {
        return None;
    }
    Some((color.to_string(), price.to_string(), qty.to_string()))
}

/// The whole inventory: categories, the items they own, and the id source.
#[derive(Clone, Debug, Default)]
pub struct Inventory {
    categories: Vec<Category>,
    items: Vec<Item>,
    ids: IdGenerator,
}

impl Inventory {
    /// Build an inventory from stored collections.
    ///
    /// Items whose category is missing are dropped so that every surviving
    /// item points at a real category.
    pub fn from_parts(categories: Vec<Category>, items: Vec<Item>) -> Self {
        let total = items.len();
        let items: Vec<Item> = items
            .into_iter()
            .filter(|item| categories.iter().any(|category| category.id == item.cat_id))
            .collect();
        if items.len() != total {
            warn!(dropped = total - items.len(), "dropped items without a category");
        }

        let mut ids = IdGenerator::default();
        for category in &categories {
            ids.observe(category.id);
        }
        for item in &items {
            ids.observe(item.id);
            for variant in &item.variants {
                ids.observe(variant.id);
            }
        }

        Self {
            categories,
            items,
            ids,
        }
    }

    /// All categories in stored order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    /// All items in stored order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Look up a category by id.
    pub fn category(&self, id: Id) -> Option<&Category> {
        self.categories.iter().find(|category| category.id == id)
    }

    /// Look up an item by id.
    pub fn item(&self, id: Id) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    /// Items owned by a category, in stored order.
    pub fn items_in(&self, cat_id: Id) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(move |item| item.cat_id == cat_id)
    }

    /// Find a category by name, ignoring case.
    pub fn find_category_by_name(&self, name: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|category| names_match(&category.name, name))
    }

    /// Find an item by name within a category, ignoring case.
    pub fn find_item_by_name(&self, cat_id: Id, name: &str) -> Option<&Item> {
        self.items_in(cat_id).find(|item| names_match(&item.name, name))
    }

    /// Add a category and return its id.
    pub fn add_category(&mut self, name: &str) -> CoreResult<Id> {
        let name = self.checked_category_name(name, None)?;
        let id = self.ids.next_id();
        info!(%id, name = %name, "category added");
        self.categories.push(Category { id, name });
        Ok(id)
    }

    /// Rename a category, keeping names unique.
    pub fn rename_category(&mut self, id: Id, new_name: &str) -> CoreResult<()> {
        if self.category(id).is_none() {
            return Err(CoreError::NotFound(format!("category {id}")));
        }
        let name = self.checked_category_name(new_name, Some(id))?;
        if let Some(category) = self.categories.iter_mut().find(|category| category.id == id) {
            info!(%id, name = %name, "category renamed");
            category.name = name;
        }
        Ok(())
    }

    /// Delete a category and every item it owns. Returns how many items went
    /// with it.
    pub fn delete_category(&mut self, id: Id) -> CoreResult<usize> {
        let Some(position) = self.categories.iter().position(|category| category.id == id) else {
            return Err(CoreError::NotFound(format!("category {id}")));
        };
        self.categories.remove(position);
        let before = self.items.len();
        self.items.retain(|item| item.cat_id != id);
        let removed = before - self.items.len();
        info!(%id, items = removed, "category deleted");
        Ok(removed)
    }

    /// Add an item to a category and return its id.
    pub fn add_item(&mut self, cat_id: Id, name: &str) -> CoreResult<Id> {
        if self.category(cat_id).is_none() {
            return Err(CoreError::NotFound(format!("category {cat_id}")));
        }
        let name = self.checked_item_name(cat_id, name, None)?;
        let id = self.ids.next_id();
        info!(%id, category = %cat_id, name = %name, "item added");
        self.items.push(Item {
            id,
            name,
            cat_id,
            variants: Vec::new(),
        });
        Ok(id)
    }

    /// Rename an item, keeping names unique within its category.
    pub fn rename_item(&mut self, id: Id, new_name: &str) -> CoreResult<()> {
        let cat_id = self
            .item(id)
            .map(|item| item.cat_id)
            .ok_or_else(|| CoreError::NotFound(format!("item {id}")))?;
        let name = self.checked_item_name(cat_id, new_name, Some(id))?;
        if let Some(item) = self.item_mut(id) {
            info!(%id, name = %name, "item renamed");
            item.name = name;
        }
        Ok(())
    }

    /// Delete an item along with its variants.
    pub fn delete_item(&mut self, id: Id) -> CoreResult<()> {
        let Some(position) = self.items.iter().position(|item| item.id == id) else {
            return Err(CoreError::NotFound(format!("item {id}")));
        };
        self.items.remove(position);
        info!(%id, "item deleted");
        Ok(())
    }

    /// Append a variant to an item and return its id.
    pub fn add_variant(&mut self, item_id: Id, color: &str, price: &str, qty: &str) -> CoreResult<Id> {
        if self.item(item_id).is_none() {
            return Err(CoreError::NotFound(format!("item {item_id}")));
        }
        let (color, price, qty) =
            variant_fields(color, price, qty).ok_or_else(missing_variant_fields)?;
        let id = self.ids.next_id();
        let variant = Variant {
            id,
            color,
            price,
            qty,
        };
        if let Some(item) = self.item_mut(item_id) {
            info!(%id, item = %item_id, "variant added");
            item.variants.push(variant);
        }
        Ok(id)
    }

    /// Overwrite a variant's fields. Incomplete input or an unknown target is
    /// ignored and reported as `false`.
    pub fn update_variant(
        &mut self,
        item_id: Id,
        variant_id: Id,
        color: &str,
        price: &str,
        qty: &str,
    ) -> bool {
        let Some((color, price, qty)) = variant_fields(color, price, qty) else {
            return false;
        };
        let Some(variant) = self
            .item_mut(item_id)
            .and_then(|item| item.variants.iter_mut().find(|variant| variant.id == variant_id))
        else {
            return false;
        };
        variant.color = color;
        variant.price = price;
        variant.qty = qty;
        true
    }

    /// Remove a variant from its item.
    pub fn delete_variant(&mut self, item_id: Id, variant_id: Id) -> CoreResult<()> {
        let item = self
            .item_mut(item_id)
            .ok_or_else(|| CoreError::NotFound(format!("item {item_id}")))?;
        let Some(position) = item.variants.iter().position(|variant| variant.id == variant_id)
        else {
            return Err(CoreError::NotFound(format!("variant {variant_id}")));
        };
        item.variants.remove(position);
        info!(id = %variant_id, item = %item_id, "variant deleted");
        Ok(())
    }

    fn item_mut(&mut self, id: Id) -> Option<&mut Item> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    fn checked_category_name(&self, raw: &str, except: Option<Id>) -> CoreResult<String> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("Category name cannot be empty.".into()));
        }
        let taken = self
            .categories
            .iter()
            .filter(|category| Some(category.id) != except)
            .any(|category| names_match(&category.name, name));
        if taken {
            return Err(CoreError::Validation(
                "Category with this name already exists.".into(),
            ));
        }
        Ok(name.to_string())
    }

    fn checked_item_name(&self, cat_id: Id, raw: &str, except: Option<Id>) -> CoreResult<String> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(CoreError::Validation("Item name cannot be empty.".into()));
        }
        let taken = self
            .items_in(cat_id)
            .filter(|item| Some(item.id) != except)
            .any(|item| names_match(&item.name, name));
        if taken {
            return Err(CoreError::Validation("Item with this name already exists.".into()));
        }
        Ok(name.to_string())
    }
}

/// Opaque string-keyed durable store.
pub trait KeyValueStore {
    /// Read the value stored under `key`, if any.
    fn read(&self, key: &str) -> CoreResult<Option<String>>;
    /// Store `value` under `key`, replacing what was there.
    fn write(&self, key: &str, value: &str) -> CoreResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shoes_with_sneaker() -> Inventory {
        Inventory::from_parts(
            vec![Category {
                id: Id::new(1),
                name: "Shoes".into(),
            }],
            vec![Item {
                id: Id::new(2),
                name: "Sneaker".into(),
                cat_id: Id::new(1),
                variants: Vec::new(),
            }],
        )
    }

    #[test]
    fn duplicate_category_names_are_rejected() {
        let mut inventory = Inventory::default();
        inventory.add_category("Shoes").unwrap();
        let result = inventory.add_category("shoes");
        assert!(matches!(result, Err(CoreError::Validation(_))));
        inventory.add_category("Bags").unwrap();
        assert_eq!(inventory.categories().len(), 2);
    }

    #[test]
    fn category_names_stay_unique_across_many_adds() {
        let mut inventory = Inventory::default();
        for name in ["Hats", "hats", " HATS ", "Gloves", "gloves", "Scarves", "", "   "] {
            let _ = inventory.add_category(name);
        }
        let names: Vec<String> = inventory
            .categories()
            .iter()
            .map(|category| category.name.to_lowercase())
            .collect();
        assert_eq!(names, vec!["hats", "gloves", "scarves"]);
    }

    #[test]
    fn empty_category_name_is_rejected() {
        let mut inventory = Inventory::default();
        let err = inventory.add_category("   ").unwrap_err();
        assert_eq!(err.message(), "Category name cannot be empty.");
        assert!(inventory.categories().is_empty());
    }

    #[test]
    fn rename_category_allows_case_change_of_itself() {
        let mut inventory = Inventory::default();
        let shoes = inventory.add_category("Shoes").unwrap();
        inventory.add_category("Bags").unwrap();
        inventory.rename_category(shoes, "SHOES").unwrap();
        assert_eq!(inventory.category(shoes).unwrap().name, "SHOES");
        assert!(matches!(
            inventory.rename_category(shoes, "bags"),
            Err(CoreError::Validation(_))
        ));
        assert!(matches!(
            inventory.rename_category(Id::new(999), "Other"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn deleting_category_cascades_to_items() {
        let mut inventory = shoes_with_sneaker();
        let removed = inventory.delete_category(Id::new(1)).unwrap();
        assert_eq!(removed, 1);
        assert!(inventory.item(Id::new(2)).is_none());
        assert!(inventory.items().iter().all(|item| item.cat_id != Id::new(1)));
    }

    #[test]
    fn cascade_leaves_other_categories_alone() {
        let mut inventory = Inventory::default();
        let shoes = inventory.add_category("Shoes").unwrap();
        let bags = inventory.add_category("Bags").unwrap();
        inventory.add_item(shoes, "Sneaker").unwrap();
        let tote = inventory.add_item(bags, "Tote").unwrap();
        inventory.delete_category(shoes).unwrap();
        assert_eq!(inventory.items().len(), 1);
        assert_eq!(inventory.items()[0].id, tote);
    }

    #[test]
    fn item_names_are_unique_per_category_only() {
        let mut inventory = Inventory::default();
        let shoes = inventory.add_category("Shoes").unwrap();
        let bags = inventory.add_category("Bags").unwrap();
        inventory.add_item(shoes, "Classic").unwrap();
        assert!(matches!(
            inventory.add_item(shoes, "classic"),
            Err(CoreError::Validation(_))
        ));
        assert!(inventory.add_item(bags, "CLASSIC").is_ok());
    }

    #[test]
    fn rename_item_checks_its_own_category() {
        let mut inventory = Inventory::default();
        let shoes = inventory.add_category("Shoes").unwrap();
        let sneaker = inventory.add_item(shoes, "Sneaker").unwrap();
        inventory.add_item(shoes, "Boot").unwrap();
        let err = inventory.rename_item(sneaker, "boot").unwrap_err();
        assert_eq!(err.message(), "Item with this name already exists.");
        inventory.rename_item(sneaker, " Runner ").unwrap();
        assert_eq!(inventory.item(sneaker).unwrap().name, "Runner");
    }

    #[test]
    fn add_item_requires_existing_category() {
        let mut inventory = Inventory::default();
        assert!(matches!(
            inventory.add_item(Id::new(5), "Ghost"),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn add_variant_appends_with_fresh_id() {
        let mut inventory = shoes_with_sneaker();
        let id = inventory
            .add_variant(Id::new(2), "Red", "19.99", "3")
            .unwrap();
        let item = inventory.item(Id::new(2)).unwrap();
        assert_eq!(item.variants.len(), 1);
        assert_eq!(item.variants[0].id, id);
        assert_ne!(id, Id::new(1));
        assert_ne!(id, Id::new(2));
        assert_eq!(item.variants[0].price, "19.99");
    }

    #[test]
    fn incomplete_variants_leave_item_unchanged() {
        let mut inventory = shoes_with_sneaker();
        let id = inventory.add_variant(Id::new(2), "Red", "10", "1").unwrap();
        for (color, price, qty) in [("", "1", "1"), ("Blue", " ", "1"), ("Blue", "1", "")] {
            let err = inventory
                .add_variant(Id::new(2), color, price, qty)
                .unwrap_err();
            assert_eq!(err.message(), "All variant fields are required.");
            assert!(!inventory.update_variant(Id::new(2), id, color, price, qty));
        }
        let item = inventory.item(Id::new(2)).unwrap();
        assert_eq!(item.variants.len(), 1);
        assert_eq!(item.variants[0].color, "Red");
        assert_eq!(item.variants[0].price, "10");
    }

    #[test]
    fn rejected_variant_does_not_consume_an_id() {
        let mut inventory = shoes_with_sneaker();
        let before = inventory.ids.last;
        assert!(inventory.add_variant(Id::new(2), "Red", "", "1").is_err());
        assert_eq!(inventory.ids.last, before);
    }

    #[test]
    fn update_variant_overwrites_fields() {
        let mut inventory = shoes_with_sneaker();
        let id = inventory.add_variant(Id::new(2), "Red", "10", "1").unwrap();
        assert!(inventory.update_variant(Id::new(2), id, "Blue ", "12", "4"));
        let variant = &inventory.item(Id::new(2)).unwrap().variants[0];
        assert_eq!(
            (variant.color.as_str(), variant.price.as_str(), variant.qty.as_str()),
            ("Blue", "12", "4")
        );
        assert!(!inventory.update_variant(Id::new(2), Id::new(77), "Blue", "1", "1"));
    }

    #[test]
    fn delete_variant_removes_only_target() {
        let mut inventory = shoes_with_sneaker();
        let red = inventory.add_variant(Id::new(2), "Red", "10", "1").unwrap();
        let blue = inventory.add_variant(Id::new(2), "Blue", "10", "1").unwrap();
        inventory.delete_variant(Id::new(2), red).unwrap();
        let item = inventory.item(Id::new(2)).unwrap();
        assert_eq!(item.variants.len(), 1);
        assert_eq!(item.variants[0].id, blue);
    }

    #[test]
    fn orphaned_items_are_dropped_on_load() {
        let inventory = Inventory::from_parts(
            vec![Category {
                id: Id::new(1),
                name: "Shoes".into(),
            }],
            vec![
                Item {
                    id: Id::new(2),
                    name: "Sneaker".into(),
                    cat_id: Id::new(1),
                    variants: Vec::new(),
                },
                Item {
                    id: Id::new(3),
                    name: "Stray".into(),
                    cat_id: Id::new(9),
                    variants: Vec::new(),
                },
            ],
        );
        assert_eq!(inventory.items().len(), 1);
    }

    #[test]
    fn generated_ids_are_distinct_and_past_loaded_ones() {
        let far_future = Id::new(u64::MAX / 2);
        let mut inventory = Inventory::from_parts(
            vec![Category {
                id: far_future,
                name: "Shoes".into(),
            }],
            Vec::new(),
        );
        let a = inventory.add_category("Bags").unwrap();
        let b = inventory.add_category("Hats").unwrap();
        assert!(a > far_future);
        assert_ne!(a, b);

        let mut ids = IdGenerator::default();
        let burst: std::collections::HashSet<Id> = (0..500).map(|_| ids.next_id()).collect();
        assert_eq!(burst.len(), 500);
    }

    #[test]
    fn item_serializes_with_cat_id_field() {
        let item = Item {
            id: Id::new(2),
            name: "Sneaker".into(),
            cat_id: Id::new(1),
            variants: vec![Variant::new(Id::new(3), "Red", "19.99", "3").unwrap()],
        };
        let json = serde_json::to_string(&item).unwrap();
        assert_eq!(
            json,
            r#"{"id":2,"name":"Sneaker","catId":1,"variants":[{"id":3,"color":"Red","price":"19.99","qty":"3"}]}"#
        );
    }
}
