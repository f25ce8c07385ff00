use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub category_id: i64,
    #[serde(default)]
    pub category_name: String,
    pub description: Option<String>,
    pub item_count: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub category_name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    pub category_id: i64,
    pub category_name: String,
    pub description: String,
}

/// Look up a category name by id, falling back to the id itself.
pub fn category_name(categories: &[Category], category_id: i64) -> String {
    categories
        .iter()
        .find(|c| c.category_id == category_id)
        .map(|c| c.category_name.clone())
        .unwrap_or_else(|| category_id.to_string())
}
