pub mod message;
pub mod prompt;
pub mod similarity;
pub mod vector;
