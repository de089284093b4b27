pub mod aggregate;
pub mod cli;
pub mod db;
pub mod error;
pub mod model;
pub mod parser;
pub mod scan;
pub mod submit;
pub mod threadfix;
pub mod thresholds;
