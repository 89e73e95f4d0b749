// Codec module - BYTES ON THE WIRE
// Fixed-width numeric primitives and the rolling identifier allocator

mod primitives;
mod rolling_id;

pub use primitives::{
    max_uint, read_bool, read_int, read_uint, write_int, write_uint, ByteReader, ByteWriter,
    CodecError, Endian, MAX_WIDTH,
};
pub use rolling_id::RollingIdAllocator;
