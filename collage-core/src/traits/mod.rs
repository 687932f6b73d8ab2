pub mod capture_device;
pub mod player;
pub mod renderer;
pub mod services;
