//! Built-in migration chains for the stores this crate knows by name.

pub mod app_ui;
pub mod chats;

use crate::migrate::MigrationChain;

/// Looks up a built-in chain by store name.
pub fn builtin_chain(name: &str) -> Option<(MigrationChain, u32)> {
    match name {
        app_ui::APP_UI_STORE => Some((app_ui::app_ui_chain(), app_ui::APP_UI_VERSION)),
        chats::CHATS_STORE => Some((chats::chats_chain(), chats::CHATS_VERSION)),
        _ => None,
    }
}
