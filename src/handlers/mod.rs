pub mod context;
pub mod health;
pub mod kv;
