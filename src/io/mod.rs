//! I/O modules for reading input tiles and emitting water tiles

pub mod tile_reader;
pub mod naming;
pub mod emitter;

pub use tile_reader::TileReader;
pub use naming::{OutputNaming, ParsedName};
pub use emitter::{GeoTiffEmitter, RasterEmitter};
