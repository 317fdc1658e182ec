pub mod attachment_store;
pub mod username_registry;
