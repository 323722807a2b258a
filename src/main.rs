#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

fn main() {
    ada_shell_lib::run()
}
