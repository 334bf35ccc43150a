//! Fixture generation for sale inventory.
//!
//! Sales are populated with generated display items; names are random
//! adjective/noun pairs and images point at a placeholder service.

use chrono::{DateTime, Utc};
use rand::Rng;

use crate::item::Item;

const ADJECTIVES: &[&str] = &[
    "Vintage",
    "Modern",
    "Sleek",
    "Elegant",
    "Rustic",
    "Classic",
    "Minimalist",
    "Luxurious",
    "Handcrafted",
    "Artisanal",
    "Eco-friendly",
    "Sustainable",
    "Organic",
    "Premium",
    "Exclusive",
    "Limited Edition",
    "Signature",
    "Designer",
    "Custom",
    "Bespoke",
];

const NOUNS: &[&str] = &[
    "Lamp",
    "Chair",
    "Table",
    "Sofa",
    "Desk",
    "Bookshelf",
    "Cabinet",
    "Rug",
    "Mirror",
    "Clock",
    "Vase",
    "Sculpture",
    "Painting",
    "Print",
    "Photograph",
    "Cushion",
    "Throw",
    "Candle",
    "Plant Pot",
    "Ornament",
];

/// Generate a display name like "Vintage Lamp".
#[must_use]
pub fn item_name() -> String {
    let mut rng = rand::thread_rng();
    let adjective = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
    let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
    format!("{adjective} {noun}")
}

/// Generate a placeholder image URL with slightly randomized dimensions.
#[must_use]
pub fn image_url() -> String {
    let mut rng = rand::thread_rng();
    let width = 300 + rng.gen_range(0..200);
    let height = 300 + rng.gen_range(0..200);
    format!("https://picsum.photos/{width}/{height}")
}

/// Generate an item id unique within practical bounds.
#[must_use]
pub fn item_id(now: DateTime<Utc>) -> String {
    let nanos = now.timestamp_nanos_opt().unwrap_or_default();
    let suffix: u32 = rand::thread_rng().gen_range(0..10_000);
    format!("item_{nanos}_{suffix}")
}

/// Generate `count` unsold items for a sale.
#[must_use]
pub fn items_for_sale(sale_id: &str, count: i32, now: DateTime<Utc>) -> Vec<Item> {
    (0..count)
        .map(|n| {
            let mut id = item_id(now);
            // Timestamp collisions within the batch are expected; disambiguate
            // with the ordinal.
            id.push_str(&format!("_{n}"));
            Item::new(id, sale_id, item_name(), image_url(), now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_pair_adjective_and_noun() {
        let name = item_name();
        assert!(ADJECTIVES.iter().any(|a| name.starts_with(a)));
        assert!(NOUNS.iter().any(|n| name.ends_with(n)));
    }

    #[test]
    fn generated_batch_has_distinct_ids() {
        let now = Utc::now();
        let items = items_for_sale("S-aa", 100, now);
        let ids: std::collections::HashSet<_> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids.len(), 100);
        assert!(items.iter().all(|i| !i.sold && i.sale_id == "S-aa"));
    }
}
