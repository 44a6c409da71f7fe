//! Pipeline stages for image-to-vector conversion.
//!
//! Each submodule implements exactly one step, so each is testable on its
//! own and the session only wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! intake ──▶ encode ──▶ client ──▶ layout ──▶ export
//! (MIME, dims) (base64)  (HTTP)   (page size) (.svg / .pdf)
//! ```
//!
//! 1. [`intake`]  validate the MIME type, hold the bytes, probe dimensions
//! 2. [`preview`]  temporary local copy of the selected file
//! 3. [`encode`]  base64-wrap the bytes into a [`encode::ConvertRequest`]
//! 4. [`client`]  the only stage with network I/O
//! 5. [`layout`]  derive PDF page size and orientation from the SVG root
//! 6. [`export`]  atomic writes of the SVG or the svg2pdf-embedded PDF

pub mod client;
pub mod encode;
pub mod export;
pub mod intake;
pub mod layout;
pub mod preview;
