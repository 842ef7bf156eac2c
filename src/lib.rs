pub mod config;
pub mod effect;
pub mod header;
pub mod logger;
pub mod resolver;
pub mod session;
pub mod vcf;
