pub mod chain;
pub mod devices;
pub mod run;
