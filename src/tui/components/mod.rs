//! TUI components for rendering different views.

mod config_diff;
mod file_view;
mod input;
mod interrupt;
mod messages;
mod sidebar;
pub mod theme;
mod thread_list;

pub use config_diff::{OptimizerDialog, render_optimizer};
pub use file_view::{FileDialog, FileOutcome, render_file};
pub use input::InputBuffer;
pub use interrupt::{InterruptPanel, PanelMode, PanelOutcome, edit_buffer};
pub use messages::render_messages;
pub use sidebar::render_sidebar;
pub use thread_list::{ThreadListDialog, render_thread_list};

/// Terminal coordinate from a count, saturating at the largest cell.
pub(crate) fn to_u16(n: usize) -> u16 {
    u16::try_from(n).unwrap_or(u16::MAX)
}
