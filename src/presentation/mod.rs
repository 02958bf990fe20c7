// Presentation layer - HTTP trigger surface
pub mod app_state;
pub mod handlers;
