mod capture_loop;
pub mod controller;
mod sink;
mod teardown;

pub use controller::SessionController;
