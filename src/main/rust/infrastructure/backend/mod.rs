mod http_backend;
mod ndjson;

pub use http_backend::{HttpInferenceBackend, NdjsonFrameStream};
pub use ndjson::{NdjsonDecoder, MAX_LINE_BYTES};
