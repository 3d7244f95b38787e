pub mod aggregate;
pub mod app;
pub mod chart;
pub mod config;
pub mod domain;
pub mod dta;
pub mod error;
pub mod frame;
pub mod fs_util;
pub mod loader;
pub mod output;
pub mod overtime;
pub mod publish;
pub mod report;
pub mod scf;
pub mod store;
pub mod tui;
