pub mod configuration;
pub use configuration::{Command, CommandLine, Config};

pub mod container_management;

pub mod error_handling;

pub mod storage;

pub mod tenancy;
pub use tenancy::ContainerService;

pub mod web_interface;
