//! Data models for the inventory backend.
//!
//! Each endpoint has an explicit result type:
//!
//! - `Paged<T>`: paged list envelope shared by items, categories and employees
//! - `Ack`: mutation acknowledgment (`{ success, message }`)
//! - `Item`, `Category`, `Employee`: single entities
//! - Auth payloads: `LoginRequest`, `TokenResponse`, `UserInfo`

pub mod auth;
pub mod category;
pub mod common;
pub mod employee;
pub mod item;

pub use auth::{LoginRequest, RefreshRequest, TokenResponse, UserInfo};
pub use category::{Category, CategoryUpdate, NewCategory};
pub use common::{Ack, PageRequest, Paged};
pub use employee::{EmailConfirmation, Employee, Registration};
pub use item::{Item, ItemAttachment, ItemUpdate, NewItem};
