pub mod app_instance;
pub mod assert_runner;
pub mod command_runner;
pub mod test_helpers;
