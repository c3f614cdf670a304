pub mod config;
pub mod dtos;
pub mod handlers;
pub mod pdf;
pub mod services;
pub mod startup;
