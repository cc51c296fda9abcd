//! Request body ingestion.
//!
//! # Data Flow
//! ```text
//! hyper body stream
//!     → reader.rs (bounded read, Content-Length precheck)
//!     → decoder.rs (encoding, content-type dispatch)
//!     → xml.rs (XML → tree, when the type is XML)
//!     → DecodedBody (value or typed DecodeError)
//! ```

pub mod decoder;
pub mod reader;
pub mod size;
pub mod xml;

pub use decoder::{decode, decode_bytes, BodyKind, DecodeError, DecodeErrorKind, DecodedBody, Encoding};
pub use reader::{read_limited, ReadError};
pub use size::ByteSize;
pub use xml::{xml_to_tree, XmlError};
