//! Rasterize PDFs, place a signature overlay on each page and re-assemble
//! the composited pages into signed PDFs.

pub mod assembler;
pub mod compositor;
pub mod config;
pub mod document;
pub mod error;
pub mod overlay;
pub mod raster;
pub mod session;
pub mod signature;
