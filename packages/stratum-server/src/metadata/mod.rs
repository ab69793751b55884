//! Attribute <-> metadata/body packing (governing spec §4.3).

pub mod codec_bridge;
pub mod packer;

pub use packer::{pack, unpack, PackedObject};
