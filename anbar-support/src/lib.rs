//! # Anbar Support
//!
//! Shared helpers for the Anbar container crates.
//!
//! Currently this is the text rendering used by diagnostics: dependency
//! chains, shortened type names, bullet lists and "did you mean?" hints.

pub mod rendering;
