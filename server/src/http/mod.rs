pub mod dto;
pub mod error;
pub mod handlers;
pub mod ndjson;
pub mod server;
pub mod state;


pub use server::{router, start_server};
