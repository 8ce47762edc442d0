//! Database query functions organized by domain.

pub mod blocks;
pub mod identities;
pub mod requests;
