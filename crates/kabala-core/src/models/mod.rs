//! Data models and configuration.

pub mod config;
pub mod receipt;

pub use config::KabalaConfig;
pub use receipt::{
    Artifact, Category, CategoryCatalog, EditEntry, FieldName, Receipt, ReceiptFields,
    ReceiptStatus,
};
