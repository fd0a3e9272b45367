#[macro_use]
extern crate diesel;

pub mod actions;
pub mod auth;
pub mod client;
pub mod dashboard;
pub mod db;
pub mod display;
pub mod error;
pub mod models;
pub mod routes;
#[rustfmt::skip]
pub mod schema;
pub mod seed;
pub mod unlock;
pub mod visibility;
