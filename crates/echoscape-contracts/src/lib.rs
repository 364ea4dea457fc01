pub mod chat;
pub mod crisis;
pub mod emotion;
pub mod events;
pub mod models;
pub mod providers;
pub mod sessions;
pub mod visual;
