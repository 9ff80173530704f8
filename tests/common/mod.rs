#![allow(dead_code)]

pub mod builders;
pub mod stubs;

pub use builders::*;
pub use stubs::*;
