//! Pipeline stages for one unit of work.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ generate
//! (path/URL) (pdfium)  (base64)   (engine)
//! ```
//!
//! 1. [`input`]    : discover files under a path, fetch URL inputs, load images
//! 2. [`render`]   : rasterise PDF pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 3. [`encode`]   : PNG-encode and base64-wrap an image for the vision endpoint
//! 4. [`generate`] : encode twice, tokenize, generate, trim the stop sequence

pub mod encode;
pub mod generate;
pub mod input;
pub mod render;
