mod accessor;
pub use accessor::*;
mod emit;
pub use emit::*;
