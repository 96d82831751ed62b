pub mod access_grant_store;
pub mod category_repository;
pub mod config;
pub mod error;
pub mod interval_settings_repository;
pub mod kanban_repository;
pub mod session_repository;
pub mod storage;
