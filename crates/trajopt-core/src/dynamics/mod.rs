//! Vehicle dynamics models

pub mod bicycle;

pub use bicycle::*;
