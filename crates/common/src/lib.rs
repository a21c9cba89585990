//! Cross-cutting helpers shared by the workspace crates.

pub mod utils;
