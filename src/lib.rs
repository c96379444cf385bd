pub mod access_manager;
pub mod bot;
pub mod config;
pub mod db;
pub mod handlers;
pub mod link_codec;
pub mod localization;
pub mod migrations;
pub mod pending_input;
pub mod rate_limiters;
pub mod screenshots;
pub mod settings_service;
pub mod settings_store;
pub mod shortener;
pub mod utils;
