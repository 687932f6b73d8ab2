pub mod peaks;
pub mod view;
