pub mod contract;
pub mod localized;
pub mod market;
