mod class;
pub use class::*;
mod patch;
pub use patch::*;
mod type_prim;
pub use type_prim::*;
mod type_shape;
pub use type_shape::*;
