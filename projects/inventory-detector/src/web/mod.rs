pub mod api;
pub mod assets;
pub mod panels;
pub mod server;
