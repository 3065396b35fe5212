//! Terminal UI module using ratatui.
//!
//! - `render`: frame layout, the debtor table and all overlays
//! - `input`: keyboard and mouse event handling
//! - `styles`: color palette and text styling

pub mod input;
pub mod render;
pub mod styles;
