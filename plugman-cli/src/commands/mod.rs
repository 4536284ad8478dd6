pub mod install;
pub mod repository;
pub mod subnet;
pub mod update;
