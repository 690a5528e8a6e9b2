//! Colors shared by the chat panels.

use ratatui::style::Color;

pub const BRAND_TEAL: Color = Color::Rgb(77, 201, 176);
pub const DIMMED: Color = Color::Rgb(100, 100, 110);
pub const PANEL_BG: Color = Color::Rgb(28, 30, 35);
pub const DIALOG_BG: Color = Color::Rgb(30, 32, 38);
pub const SELECTED_BG: Color = Color::Rgb(45, 48, 55);
pub const ERROR_COLOR: Color = Color::Red;
pub const WARN_COLOR: Color = Color::Rgb(200, 160, 80);
pub const HUMAN_COLOR: Color = Color::Rgb(160, 100, 200);
pub const TOOL_COLOR: Color = Color::Rgb(80, 140, 180);

pub const DIFF_ADD_FG: Color = Color::Rgb(100, 180, 100);
pub const DIFF_DEL_FG: Color = Color::Rgb(220, 100, 100);
pub const DIFF_ADD_BG: Color = Color::Rgb(35, 50, 35);
pub const DIFF_DEL_BG: Color = Color::Rgb(55, 35, 35);
