// Engine result decoding: pair records, match spans and absolute positions.

pub mod decoder;
pub mod model;
pub mod positions;
