pub mod context;
pub mod propagation;
