pub mod contract;
pub mod market;
pub mod outcome;
pub mod portfolio;
pub mod recommendation;
