mod name_space;
pub use name_space::*;
mod resolve;
pub use resolve::*;
mod table;
pub use table::*;
mod worker;
use worker::Pool;
