pub mod app;
pub mod bgp;
pub mod services;
pub mod utils;
