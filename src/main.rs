#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    chat_to_notion_lib::desktop::run()
}
