pub mod codec;
pub mod document;
pub mod repository;
pub mod store;
pub mod todo;
