//! Optional filters for short or noisy text.
//!
//! Both are off by default: the corpus then keeps everything the cleaner produced.
mod filter;
pub mod text;

pub use filter::Filter;
pub use text::{Length, NoiseFilter, ShortNoise};
