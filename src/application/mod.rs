pub mod notifier;
pub mod shared_list;
pub mod todo_controller;
mod todo_controller_tests;
pub mod ui_state;
