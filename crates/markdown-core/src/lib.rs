mod blocks;
mod command;
mod config;
mod core;
mod error;
mod hotkeys;
mod list;
mod markdown;
mod marks;
mod node;
mod normalize;
mod ops;
pub mod path;
mod selection;
mod table;
mod transforms;

pub use crate::blocks::*;
pub use crate::command::*;
pub use crate::config::*;
pub use crate::core::*;
pub use crate::error::*;
pub use crate::hotkeys::*;
pub use crate::list::*;
pub use crate::markdown::*;
pub use crate::marks::*;
pub use crate::node::*;
pub use crate::normalize::*;
pub use crate::ops::*;
pub use crate::selection::*;
pub use crate::table::*;
pub use crate::transforms::*;
