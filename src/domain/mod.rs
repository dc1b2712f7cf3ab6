pub mod dam;

pub use dam::*;
