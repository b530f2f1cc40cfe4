// src/utils/mod.rs

pub mod extract;
pub mod oauth;
pub mod security;
pub mod session;
