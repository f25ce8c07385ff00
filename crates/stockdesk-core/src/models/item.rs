use serde::{Deserialize, Serialize};

use crate::api::request::{FilePart, MultipartForm};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Item {
    #[serde(rename = "itemId")]
    pub item_id: i64,
    #[serde(rename = "itemName", default)]
    pub item_name: String,
    #[serde(default)]
    pub quantity: i64,
    #[serde(rename = "originalQuantity", default)]
    pub original_quantity: i64,
    pub location: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "categoryId")]
    pub category_id: Option<i64>,
    #[serde(rename = "fileId")]
    pub file_id: Option<String>,
}

impl Item {
    /// Quantity handed out since the item was registered.
    pub fn checked_out(&self) -> i64 {
        (self.original_quantity - self.quantity).max(0)
    }

    pub fn location_display(&self) -> &str {
        self.location.as_deref().filter(|l| !l.is_empty()).unwrap_or("-")
    }
}

/// File uploaded together with an item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemAttachment {
    pub file_name: String,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

impl ItemAttachment {
    fn into_part(self, field: &str) -> FilePart {
        FilePart {
            field: field.to_string(),
            file_name: self.file_name,
            content_type: self.content_type,
            data: self.data,
        }
    }
}

/// Fields for creating an item. Sent as a multipart form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewItem {
    pub item_name: String,
    pub quantity: i64,
    pub original_quantity: i64,
    pub location: String,
    pub description: String,
    pub category_id: i64,
    pub file: Option<ItemAttachment>,
}

impl NewItem {
    pub fn to_form(&self) -> MultipartForm {
        let form = MultipartForm::new()
            .text("itemName", self.item_name.clone())
            .text("quantity", self.quantity.to_string())
            .text("originalQuantity", self.original_quantity.to_string())
            .text("location", self.location.clone())
            .text("description", self.description.clone())
            .text("categoryId", self.category_id.to_string());
        match self.file.clone() {
            Some(file) => form.file(file.into_part("file")),
            None => form,
        }
    }
}

/// Fields for updating an item. The update endpoint binds PascalCase form
/// names, unlike create.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemUpdate {
    pub item_id: i64,
    pub item_name: String,
    pub quantity: i64,
    pub original_quantity: i64,
    pub location: String,
    pub description: String,
    pub category_id: i64,
    pub file_id: Option<String>,
    pub file: Option<ItemAttachment>,
}

impl ItemUpdate {
    /// Start an update from the current state of an item.
    pub fn from_item(item: &Item) -> Self {
        Self {
            item_id: item.item_id,
            item_name: item.item_name.clone(),
            quantity: item.quantity,
            original_quantity: item.original_quantity,
            location: item.location.clone().unwrap_or_default(),
            description: item.description.clone().unwrap_or_default(),
            category_id: item.category_id.unwrap_or_default(),
            file_id: item.file_id.clone(),
            file: None,
        }
    }

    pub fn to_form(&self) -> MultipartForm {
        let form = MultipartForm::new()
            .text("ItemId", self.item_id.to_string())
            .text("ItemName", self.item_name.clone())
            .text("Quantity", self.quantity.to_string())
            .text("OriginalQuantity", self.original_quantity.to_string())
            .text("Location", self.location.clone())
            .text("Description", self.description.clone())
            .text("CategoryId", self.category_id.to_string())
            .text("FileId", self.file_id.clone().unwrap_or_default());
        match self.file.clone() {
            Some(file) => form.file(file.into_part("File")),
            None => form,
        }
    }
}
