pub mod ai_format;
pub mod cache_status;
pub mod dataset_summary;
pub mod forecast;
pub mod list_items;
pub mod list_stores;
pub mod response_types;
