//! A generative adversarial network on a small dense matrix type, trained with
//! hand-written backpropagation and plain SGD.

pub mod config;
pub mod gan;
pub mod matrix;
pub mod mnist;
pub mod prelude;
pub mod viz;
