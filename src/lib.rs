pub mod assignment;
pub mod cli;
pub mod clustering;
pub mod config;
pub mod corpus;
pub mod element_similarity;
pub mod grid_matcher;
pub mod matrix;
pub mod page;
pub mod pipeline;
pub mod report;
pub mod tree_compare;
pub mod utils;

pub use cli::*;
pub use clustering::*;
pub use config::*;
pub use corpus::*;
pub use element_similarity::*;
pub use grid_matcher::*;
pub use matrix::*;
pub use page::*;
pub use pipeline::*;
pub use report::*;
pub use tree_compare::*;
pub use utils::*;
