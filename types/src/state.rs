//! Save-data documents and the baseline template.
//!
//! Defines the document alias, the default field set, the shallow merge
//! applied at read time, and coin crediting.

use serde_json::{json, Map, Value};

/// A player's save data: an arbitrary top-level JSON object. The store is
/// opaque to its contents beyond the top-level field names.
pub type Document = Map<String, Value>;

/// Field credited by the referral bonus.
pub const COINS_FIELD: &str = "coins";

/// Default save data for a player with no stored state.
///
/// Stored documents are merged over this template at read time, so any field
/// a client never saved comes back at its default.
pub fn baseline_state() -> Document {
    Document::from_iter([
        ("coins".to_string(), json!(0)),
        ("clickLevel".to_string(), json!(1)),
        ("clickValue".to_string(), json!(1)),
        ("energyLevel".to_string(), json!(1)),
        ("maxEnergy".to_string(), json!(10)),
        ("energy".to_string(), json!(10)),
        ("autoLevel".to_string(), json!(1)),
        ("regenLevel".to_string(), json!(1)),
        ("energyRegenRate".to_string(), json!(1.0)),
        ("lastEnergyAt".to_string(), json!(0)),
        ("lastIncomeAt".to_string(), json!(0)),
        ("farms".to_string(), json!([])),
        ("clickCount".to_string(), json!(0)),
        ("totalEarned".to_string(), json!(0)),
        ("quests".to_string(), json!({})),
        ("achievements".to_string(), json!({})),
        ("level".to_string(), json!(1)),
        ("steam_rub".to_string(), json!(0)),
    ])
}

/// Merge a stored document over the baseline template.
///
/// The merge is shallow: every stored top-level field wins over the baseline
/// field of the same name, nested objects are replaced wholesale rather than
/// defaulted field-by-field, and stored fields the baseline does not know
/// are kept.
pub fn merge_with_baseline(stored: Document) -> Document {
    let mut merged = baseline_state();
    for (field, value) in stored {
        merged.insert(field, value);
    }
    merged
}

/// Add `bonus` to a document's `coins` field in place.
///
/// A missing or non-numeric balance counts as zero. Integer balances use
/// saturating arithmetic; fractional balances stay fractional.
pub fn credit_coins(document: &mut Document, bonus: u64) {
    let current = document.get(COINS_FIELD);
    let credited = if let Some(balance) = current.and_then(Value::as_i64) {
        json!(balance.saturating_add(bonus as i64))
    } else if let Some(balance) = current.and_then(Value::as_u64) {
        json!(balance.saturating_add(bonus))
    } else if let Some(balance) = current.and_then(Value::as_f64) {
        json!(balance + bonus as f64)
    } else {
        json!(bonus)
    };
    document.insert(COINS_FIELD.to_string(), credited);
}
