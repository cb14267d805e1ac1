//! # subtrack
//!
//! Client-side integration layer for the subscription tracker: Supabase
//! authentication, CRUD over the `subscriptions` table, and route guards,
//! all writing into one injected state container.

pub mod app;
pub mod backend;
pub mod config;
pub mod services;
pub mod state;
pub mod subscription;

pub use app::App;
