pub mod api;
pub mod app_state;
pub mod auth;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod render;
pub mod repository;
pub mod storage;
pub mod validator;
