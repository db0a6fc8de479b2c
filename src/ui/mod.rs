//! Terminal output for the CLI

pub mod icons;
pub mod output;
pub mod table;

pub use icons::Icons;
pub use output::{Palette, error, header, info, serve_banner, success, warn};
pub use table::stats_table;
