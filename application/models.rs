pub mod credential;
pub mod index;
pub mod metadata;
pub mod version;
